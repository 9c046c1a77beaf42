//! Engine facade: wires collaborators to the state machines and exposes the
//! public surface consumed by the thin API layer.
//!
//! Built through `EngineBuilder`, which defaults every collaborator to its
//! in-memory implementation and accepts overrides (useful for tests and for
//! production wiring alike).

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::games::crash::{RoundActor, RoundDeps, RoundHandle};
use crate::games::instant::InstantEngine;
use crate::games::session::SessionEngine;
use crate::games::types::{
    BetReceipt, CrashBetRequest, GameType, InstantOutcome, InstantPlayRequest, RoundPhase,
    RoundSnapshot, SessionStartRequest, SessionView, SettledBet,
};
use crate::history::{Fanout, HistoryStore, InMemoryHistory, OutcomeRecord, BroadcastFanout};
use crate::ledger::{InMemoryLedger, Ledger};
use crate::metrics::EngineMetrics;
use crate::seeds::{InMemorySeedRegistry, SeedCommitment, SeedRegistry, SeedRotation};
use crate::settlement::SettlementBridge;
use crate::store::SessionStore;
use crate::validate::{AllowAll, StakeValidator, UserStatus};
use crate::verify::{self, VerifiedOutcome, VerifyRequest};
use std::sync::Arc;
use std::time::Duration;

pub struct GameEngine {
    config: Arc<EngineConfig>,
    registry: Arc<dyn SeedRegistry>,
    history: Arc<dyn HistoryStore>,
    round: RoundHandle,
    sessions: Arc<SessionEngine>,
    instant: InstantEngine,
    metrics: Arc<EngineMetrics>,
    sweep: tokio::task::JoinHandle<()>,
}

impl GameEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    // Shared round operations.

    pub async fn place_crash_bet(&self, request: CrashBetRequest) -> EngineResult<BetReceipt> {
        self.round.place_bet(request).await
    }

    pub async fn crash_cash_out(&self, user_id: &str) -> EngineResult<SettledBet> {
        self.round.cash_out(user_id).await
    }

    pub async fn round_state(&self) -> EngineResult<RoundSnapshot> {
        self.round.snapshot().await
    }

    // Stepped session operations.

    pub async fn start_session(&self, request: SessionStartRequest) -> EngineResult<SessionView> {
        self.sessions.start(request).await
    }

    pub async fn step_session(
        &self,
        user_id: &str,
        game: GameType,
        position: u32,
    ) -> EngineResult<SessionView> {
        self.sessions.step(user_id, game, position).await
    }

    pub async fn cash_out_session(
        &self,
        user_id: &str,
        game: GameType,
    ) -> EngineResult<SessionView> {
        self.sessions.cash_out(user_id, game).await
    }

    pub async fn active_session(&self, user_id: &str, game: GameType) -> Option<SessionView> {
        self.sessions.active(user_id, game).await
    }

    // Single-step games.

    pub async fn play_instant(&self, request: InstantPlayRequest) -> EngineResult<InstantOutcome> {
        self.instant.play(request).await
    }

    // Seeds, history, verification.

    pub fn seed_commitment(&self, user_id: &str) -> EngineResult<SeedCommitment> {
        self.registry.current(user_id)
    }

    pub fn rotate_seeds(&self, user_id: &str) -> EngineResult<SeedRotation> {
        self.registry.rotate(user_id)
    }

    pub fn set_client_seed(&self, user_id: &str, client_seed: &str) -> EngineResult<SeedCommitment> {
        self.registry.set_client_seed(user_id, client_seed)
    }

    /// A user's recent outcome records, newest first. Server seeds that are
    /// not yet revealable (the user's live pair, or the round in progress)
    /// are blanked; everything else ships with full reveal material.
    pub async fn history(&self, user_id: &str, limit: usize) -> EngineResult<Vec<OutcomeRecord>> {
        let mut records = self
            .history
            .recent(user_id, limit)
            .await
            .map_err(|e| EngineError::Infrastructure(e.to_string()))?;

        let round = self.round.snapshot().await?;
        let current = self.registry.current(user_id)?;

        for record in &mut records {
            let unrevealed = match record.game {
                GameType::Crash => {
                    record.server_seed_hash == round.server_seed_hash
                        && round.phase != RoundPhase::Crashed
                }
                _ => record.server_seed_hash == current.server_seed_hash,
            };
            if unrevealed {
                record.server_seed.clear();
            }
        }

        Ok(records)
    }

    /// Recompute an outcome from revealed material. An integrity failure
    /// halts further issuance on the caller's seed pair.
    pub fn verify_outcome(
        &self,
        user_id: &str,
        request: &VerifyRequest,
    ) -> EngineResult<VerifiedOutcome> {
        match verify::verify(request, &self.config) {
            Ok(outcome) => Ok(outcome),
            Err(err @ EngineError::Integrity(_)) => {
                tracing::error!(
                    user = user_id,
                    game = %request.game,
                    error = %err,
                    "verification failed; halting seed pair"
                );
                self.registry.halt(user_id);
                Err(err)
            }
            Err(other) => Err(other),
        }
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for GameEngine {
    fn drop(&mut self) {
        self.sweep.abort();
    }
}

/// Builder with in-memory defaults and per-collaborator overrides.
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    registry: Option<Arc<dyn SeedRegistry>>,
    ledger: Option<Arc<dyn Ledger>>,
    history: Option<Arc<dyn HistoryStore>>,
    fanout: Option<Arc<dyn Fanout>>,
    user_status: Option<Arc<dyn UserStatus>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            registry: None,
            ledger: None,
            history: None,
            fanout: None,
            user_status: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn SeedRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_fanout(mut self, fanout: Arc<dyn Fanout>) -> Self {
        self.fanout = Some(fanout);
        self
    }

    pub fn with_user_status(mut self, user_status: Arc<dyn UserStatus>) -> Self {
        self.user_status = Some(user_status);
        self
    }

    pub fn build(self) -> EngineResult<GameEngine> {
        let config = Arc::new(self.config.unwrap_or_default());
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(InMemorySeedRegistry::new()));
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryLedger::new()));
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistory::new()));
        let fanout = self
            .fanout
            .unwrap_or_else(|| Arc::new(BroadcastFanout::default()));
        let user_status = self.user_status.unwrap_or_else(|| Arc::new(AllowAll));

        let metrics = Arc::new(
            EngineMetrics::new().map_err(|e| EngineError::Infrastructure(e.to_string()))?,
        );
        let validator = Arc::new(StakeValidator::new(&config.currencies, user_status));
        let settlement = Arc::new(SettlementBridge::new(
            ledger.clone(),
            history.clone(),
            fanout.clone(),
            metrics.clone(),
            config.settlement.clone(),
        ));
        let store = Arc::new(SessionStore::new(Duration::from_secs(
            config.store.session_ttl_secs,
        )));

        let sessions = Arc::new(SessionEngine::new(
            config.clone(),
            validator.clone(),
            registry.clone(),
            ledger.clone(),
            store.clone(),
            settlement.clone(),
            fanout.clone(),
            metrics.clone(),
        ));
        let instant = InstantEngine::new(
            config.clone(),
            validator.clone(),
            registry.clone(),
            ledger.clone(),
            settlement.clone(),
            metrics.clone(),
        );
        let round = RoundActor::spawn(
            config.clone(),
            RoundDeps {
                validator,
                ledger,
                settlement,
                fanout,
                metrics: metrics.clone(),
            },
        );

        let sweep = spawn_sweep(
            store,
            sessions.clone(),
            Duration::from_secs(config.store.sweep_interval_secs),
        );

        Ok(GameEngine {
            config,
            registry,
            history,
            round,
            sessions,
            instant,
            metrics,
            sweep,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Background reconciliation sweep: expired ACTIVE sessions become forfeits
/// off the hot path.
fn spawn_sweep(
    store: Arc<SessionStore>,
    sessions: Arc<SessionEngine>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            for record in store.collect_expired() {
                if let Err(e) = sessions.reconcile_expired(record).await {
                    tracing::error!(error = %e, "expired session reconciliation failed");
                }
            }
        }
    })
}
