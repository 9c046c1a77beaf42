//! Configuration management for the fairplay game engine.
//!
//! Centralized configuration with TOML loading, environment variable
//! overrides, and validation. Payout economics (house edges, curve
//! parameters, grid shapes) are configuration consumed by the engine,
//! never decided by it.

use crate::errors::{ConfigError, EngineResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Top-level engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub crash: CrashConfig,
    pub mines: MinesConfig,
    pub towers: TowersConfig,
    pub instant: InstantConfig,
    pub store: StoreConfig,
    pub settlement: SettlementConfig,
    /// Currency codes the engine accepts for wagers.
    pub currencies: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crash: CrashConfig::default(),
            mines: MinesConfig::default(),
            towers: TowersConfig::default(),
            instant: InstantConfig::default(),
            store: StoreConfig::default(),
            settlement: SettlementConfig::default(),
            currencies: vec!["USD".to_string(), "EUR".to_string(), "USDT".to_string()],
        }
    }
}

/// Per-game stake limits shared by all game configs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StakeLimits {
    pub min_bet: f64,
    pub max_bet: f64,
}

impl Default for StakeLimits {
    fn default() -> Self {
        Self {
            min_bet: 0.10,
            max_bet: 1_000.0,
        }
    }
}

/// Shared ascending-multiplier round configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrashConfig {
    pub limits: StakeLimits,
    /// House edge applied by the crash-point transform, in [0, 1).
    pub house_edge: f64,
    /// Lowest possible crash multiplier (instant-crash outcomes land here).
    pub min_multiplier: f64,
    /// Exponent rate of the displayed multiplier curve, per second.
    pub growth_rate: f64,
    /// Length of the WAITING phase during which bets are accepted.
    pub betting_window_ms: u64,
    /// Clock period of the RUNNING phase.
    pub tick_interval_ms: u64,
    /// Pause between CRASHED and the next WAITING phase.
    pub intermission_ms: u64,
    /// Operator-wide client seed mixed into every round derivation.
    pub client_seed: String,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            limits: StakeLimits::default(),
            house_edge: 0.01,
            min_multiplier: 1.0,
            growth_rate: 0.06,
            betting_window_ms: 15_000,
            tick_interval_ms: 50,
            intermission_ms: 4_000,
            client_seed: "global".to_string(),
        }
    }
}

/// Hidden-hazard-grid session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MinesConfig {
    pub limits: StakeLimits,
    pub house_edge: f64,
    /// Total grid slots.
    pub slots: u32,
    /// Default hazard count when a request does not specify one.
    pub default_hazards: u32,
    /// Decimal places the running multiplier is truncated to.
    pub multiplier_precision: u32,
}

impl Default for MinesConfig {
    fn default() -> Self {
        Self {
            limits: StakeLimits::default(),
            house_edge: 0.01,
            slots: 25,
            default_hazards: 5,
            multiplier_precision: 4,
        }
    }
}

/// Row-climb session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TowersConfig {
    pub limits: StakeLimits,
    pub house_edge: f64,
    /// Columns per row.
    pub columns: u32,
    /// Rows to the top of the tower.
    pub rows: u32,
    /// Hazardous columns per row.
    pub hazards_per_row: u32,
    pub multiplier_precision: u32,
}

impl Default for TowersConfig {
    fn default() -> Self {
        Self {
            limits: StakeLimits::default(),
            house_edge: 0.02,
            columns: 2,
            rows: 8,
            hazards_per_row: 1,
            multiplier_precision: 2,
        }
    }
}

/// Single-step game configuration (coin flip, card draw).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstantConfig {
    pub limits: StakeLimits,
    pub house_edge: f64,
}

impl Default for InstantConfig {
    fn default() -> Self {
        Self {
            limits: StakeLimits::default(),
            house_edge: 0.01,
        }
    }
}

/// Session store TTL and reconciliation sweep cadence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 3_600,
            sweep_interval_secs: 60,
        }
    }
}

/// Retry policy for ledger credits during settlement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub credit_retry_attempts: u32,
    pub credit_retry_backoff_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            credit_retry_attempts: 3,
            credit_retry_backoff_ms: 100,
        }
    }
}

/// Configuration loader with environment variable support.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path.
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables.
    pub fn load(&self) -> EngineResult<EngineConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            EngineConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> EngineResult<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) -> EngineResult<()> {
        if let Ok(ttl) = env::var("FAIRPLAY_SESSION_TTL_SECS") {
            config.store.session_ttl_secs = ttl.parse().map_err(|_| ConfigError::InvalidValue {
                field: "FAIRPLAY_SESSION_TTL_SECS".to_string(),
                value: ttl,
                reason: "invalid integer".to_string(),
            })?;
        }
        if let Ok(tick) = env::var("FAIRPLAY_CRASH_TICK_MS") {
            config.crash.tick_interval_ms =
                tick.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "FAIRPLAY_CRASH_TICK_MS".to_string(),
                    value: tick,
                    reason: "invalid integer".to_string(),
                })?;
        }
        if let Ok(window) = env::var("FAIRPLAY_CRASH_BETTING_WINDOW_MS") {
            config.crash.betting_window_ms =
                window.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "FAIRPLAY_CRASH_BETTING_WINDOW_MS".to_string(),
                    value: window,
                    reason: "invalid integer".to_string(),
                })?;
        }
        if let Ok(currencies) = env::var("FAIRPLAY_CURRENCIES") {
            config.currencies = currencies
                .split(',')
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
        }

        Ok(())
    }

    /// Validate configuration values.
    fn validate(&self, config: &EngineConfig) -> EngineResult<()> {
        for (name, limits) in [
            ("crash", &config.crash.limits),
            ("mines", &config.mines.limits),
            ("towers", &config.towers.limits),
            ("instant", &config.instant.limits),
        ] {
            if limits.min_bet <= 0.0 || limits.max_bet < limits.min_bet {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.limits", name),
                    value: format!("[{}, {}]", limits.min_bet, limits.max_bet),
                    reason: "min_bet must be positive and not exceed max_bet".to_string(),
                }
                .into());
            }
        }

        for (name, edge) in [
            ("crash.house_edge", config.crash.house_edge),
            ("mines.house_edge", config.mines.house_edge),
            ("towers.house_edge", config.towers.house_edge),
            ("instant.house_edge", config.instant.house_edge),
        ] {
            if !(0.0..1.0).contains(&edge) {
                return Err(ConfigError::InvalidValue {
                    field: name.to_string(),
                    value: edge.to_string(),
                    reason: "house edge must lie in [0, 1)".to_string(),
                }
                .into());
            }
        }

        if config.crash.min_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "crash.min_multiplier".to_string(),
                value: config.crash.min_multiplier.to_string(),
                reason: "minimum multiplier cannot be below 1.0".to_string(),
            }
            .into());
        }
        if config.crash.growth_rate <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "crash.growth_rate".to_string(),
                value: config.crash.growth_rate.to_string(),
                reason: "growth rate must be positive".to_string(),
            }
            .into());
        }
        if config.crash.tick_interval_ms == 0 || config.crash.betting_window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "crash.timing".to_string(),
                value: format!(
                    "tick={} window={}",
                    config.crash.tick_interval_ms, config.crash.betting_window_ms
                ),
                reason: "round timings cannot be zero".to_string(),
            }
            .into());
        }

        if config.mines.slots < 2 || config.mines.default_hazards == 0
            || config.mines.default_hazards >= config.mines.slots
        {
            return Err(ConfigError::InvalidValue {
                field: "mines".to_string(),
                value: format!(
                    "slots={} hazards={}",
                    config.mines.slots, config.mines.default_hazards
                ),
                reason: "hazards must leave at least one safe slot".to_string(),
            }
            .into());
        }

        if config.towers.columns < 2
            || config.towers.rows == 0
            || config.towers.hazards_per_row == 0
            || config.towers.hazards_per_row >= config.towers.columns
        {
            return Err(ConfigError::InvalidValue {
                field: "towers".to_string(),
                value: format!(
                    "columns={} rows={} hazards_per_row={}",
                    config.towers.columns, config.towers.rows, config.towers.hazards_per_row
                ),
                reason: "each row needs at least one safe and one hazardous column".to_string(),
            }
            .into());
        }

        if config.store.session_ttl_secs == 0 || config.store.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "store".to_string(),
                value: format!(
                    "ttl={} sweep={}",
                    config.store.session_ttl_secs, config.store.sweep_interval_secs
                ),
                reason: "store timings cannot be zero".to_string(),
            }
            .into());
        }

        if config.currencies.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "currencies".to_string(),
                value: "[]".to_string(),
                reason: "at least one accepted currency is required".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, config: &EngineConfig, path: &str) -> EngineResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SaveFailed(format!("failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::SaveFailed(format!("failed to write {}: {}", path, e)).into())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(ConfigLoader::new().validate(&config).is_ok());
        assert_eq!(config.mines.slots, 25);
        assert_eq!(config.towers.columns, 2);
    }

    #[test]
    fn validation_rejects_inverted_limits() {
        let mut config = EngineConfig::default();
        config.crash.limits.max_bet = config.crash.limits.min_bet / 2.0;
        assert!(ConfigLoader::new().validate(&config).is_err());
    }

    #[test]
    fn validation_rejects_full_hazard_grid() {
        let mut config = EngineConfig::default();
        config.mines.default_hazards = config.mines.slots;
        assert!(ConfigLoader::new().validate(&config).is_err());
    }

    #[test]
    fn validation_rejects_out_of_range_edge() {
        let mut config = EngineConfig::default();
        config.towers.house_edge = 1.0;
        assert!(ConfigLoader::new().validate(&config).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = EngineConfig::default();
        let loader = ConfigLoader::new();
        loader.save(&original, path).unwrap();

        let loaded = ConfigLoader::new().with_path(path).load().unwrap();
        assert_eq!(loaded.crash.betting_window_ms, original.crash.betting_window_ms);
        assert_eq!(loaded.currencies, original.currencies);
        assert_eq!(loaded.mines.multiplier_precision, original.mines.multiplier_precision);
    }
}
