//! Engine counters exposed through a prometheus registry.

use once_cell::sync::Lazy;
use prometheus::{Counter, IntCounter, Registry};
use std::sync::Arc;

/// Process-wide default metrics instance.
pub static DEFAULT_METRICS: Lazy<Arc<EngineMetrics>> = Lazy::new(|| {
    Arc::new(EngineMetrics::new().expect("default metric names are valid"))
});

pub struct EngineMetrics {
    registry: Registry,
    pub bets_placed: IntCounter,
    pub wagered_total: Counter,
    pub payouts_total: Counter,
    pub settlements_total: IntCounter,
    pub settlement_retries: IntCounter,
    pub sessions_expired: IntCounter,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bets_placed =
            IntCounter::new("fairplay_bets_placed_total", "Bets and sessions accepted")?;
        let wagered_total = Counter::new("fairplay_wagered_total", "Total stake debited")?;
        let payouts_total = Counter::new("fairplay_payouts_total", "Total payouts credited")?;
        let settlements_total =
            IntCounter::new("fairplay_settlements_total", "Settlements completed")?;
        let settlement_retries = IntCounter::new(
            "fairplay_settlement_retries_total",
            "Ledger credit retries during settlement",
        )?;
        let sessions_expired = IntCounter::new(
            "fairplay_sessions_expired_total",
            "Abandoned sessions reconciled by the TTL sweep",
        )?;

        registry.register(Box::new(bets_placed.clone()))?;
        registry.register(Box::new(wagered_total.clone()))?;
        registry.register(Box::new(payouts_total.clone()))?;
        registry.register(Box::new(settlements_total.clone()))?;
        registry.register(Box::new(settlement_retries.clone()))?;
        registry.register(Box::new(sessions_expired.clone()))?;

        Ok(Self {
            registry,
            bets_placed,
            wagered_total,
            payouts_total,
            settlements_total,
            settlement_retries,
            sessions_expired,
        })
    }

    /// Gather current metric families, e.g. for a scrape endpoint.
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.bets_placed.inc();
        metrics.bets_placed.inc();
        metrics.wagered_total.inc_by(12.5);

        assert_eq!(metrics.bets_placed.get(), 2);
        assert_eq!(metrics.wagered_total.get(), 12.5);
        assert!(!metrics.gather().is_empty());
    }
}
