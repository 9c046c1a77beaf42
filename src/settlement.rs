//! Settlement & ledger bridge.
//!
//! Converts a terminal state transition into at most one ledger credit and
//! exactly one immutable history record. The caller owns the atomic
//! check-and-clear of the entity's active flag (the round actor and the
//! per-session lock both guarantee exclusive access); this bridge is only
//! ever invoked after that flip, so a given entity reaches it once.

use crate::config::SettlementConfig;
use crate::errors::{EngineError, EngineResult};
use crate::games::outcome::truncate;
use crate::games::types::{Currency, GameType};
use crate::history::{EngineEvent, Fanout, HistoryStore, OutcomeDetail, OutcomeRecord, topics};
use crate::ledger::Ledger;
use crate::metrics::EngineMetrics;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Seed material carried into every record for independent verification.
#[derive(Debug, Clone)]
pub struct RevealMaterial {
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// One terminal transition ready to be settled.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Bet or session id; also keys the credit's idempotency.
    pub entity_id: Uuid,
    pub game: GameType,
    pub user_id: Option<String>,
    pub stake: f64,
    pub currency: Currency,
    /// Already truncated by the game's payout math. Zero for losses.
    pub payout: f64,
    pub multiplier: f64,
    pub detail: OutcomeDetail,
    pub seed: RevealMaterial,
}

pub struct SettlementBridge {
    ledger: Arc<dyn Ledger>,
    history: Arc<dyn HistoryStore>,
    fanout: Arc<dyn Fanout>,
    metrics: Arc<EngineMetrics>,
    config: SettlementConfig,
}

impl SettlementBridge {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        history: Arc<dyn HistoryStore>,
        fanout: Arc<dyn Fanout>,
        metrics: Arc<EngineMetrics>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            history,
            fanout,
            metrics,
            config,
        }
    }

    /// Payout for a stake at a multiplier, truncated to cents.
    pub fn payout_for(stake: f64, multiplier: f64) -> f64 {
        truncate(stake * multiplier, 2)
    }

    /// Settle one terminal transition: append the record, then credit any
    /// payout with an idempotent, retried ledger call, then fan out.
    ///
    /// The history record is written win or loss. A credit that keeps
    /// failing after retries is logged and surfaced through metrics; the
    /// idempotency key makes later out-of-band replays safe.
    pub async fn settle(&self, settlement: Settlement) -> EngineResult<OutcomeRecord> {
        let record = OutcomeRecord {
            id: settlement.entity_id,
            game: settlement.game,
            user_id: settlement.user_id.clone(),
            stake: settlement.stake,
            currency: Some(settlement.currency.clone()),
            payout: settlement.payout,
            multiplier: settlement.multiplier,
            detail: settlement.detail.clone(),
            server_seed: settlement.seed.server_seed.clone(),
            server_seed_hash: settlement.seed.server_seed_hash.clone(),
            client_seed: settlement.seed.client_seed.clone(),
            nonce: settlement.seed.nonce,
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        self.history
            .append(record.clone())
            .await
            .map_err(|e| EngineError::Infrastructure(e.to_string()))?;

        if settlement.payout > 0.0 {
            if let Some(user_id) = &settlement.user_id {
                self.credit_with_retry(
                    user_id,
                    settlement.payout,
                    &settlement.currency,
                    &format!("credit:{}", settlement.entity_id),
                )
                .await;
            }
        }

        self.metrics.settlements_total.inc();
        self.metrics.payouts_total.inc_by(settlement.payout);

        if let Some(user_id) = &settlement.user_id {
            self.fanout.publish(
                topics::SETTLEMENTS,
                EngineEvent::BetSettled {
                    user_id: user_id.clone(),
                    game: settlement.game,
                    payout: settlement.payout,
                    multiplier: settlement.multiplier,
                },
            );
        }

        Ok(record)
    }

    /// Append the terminal record of a shared round. Round summaries belong
    /// to no user and carry no currency; their reveal material is what lets
    /// every participant verify the crash point.
    pub async fn record_round_summary(
        &self,
        round_id: Uuid,
        round_number: u64,
        crash_point: f64,
        bets: usize,
        seed: RevealMaterial,
    ) -> EngineResult<OutcomeRecord> {
        let record = OutcomeRecord {
            id: round_id,
            game: GameType::Crash,
            user_id: None,
            stake: 0.0,
            currency: None,
            payout: 0.0,
            multiplier: crash_point,
            detail: OutcomeDetail::RoundSummary {
                round_number,
                crash_point,
                bets,
            },
            server_seed: seed.server_seed,
            server_seed_hash: seed.server_seed_hash,
            client_seed: seed.client_seed,
            nonce: seed.nonce,
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        self.history
            .append(record.clone())
            .await
            .map_err(|e| EngineError::Infrastructure(e.to_string()))?;
        Ok(record)
    }

    /// Credit with the same idempotency key on every attempt so the amount
    /// is applied at most once even under retry.
    async fn credit_with_retry(
        &self,
        user_id: &str,
        amount: f64,
        currency: &Currency,
        idempotency_key: &str,
    ) {
        let mut attempt = 0;
        loop {
            match self
                .ledger
                .credit(user_id, amount, currency, idempotency_key)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.credit_retry_attempts {
                        tracing::error!(
                            user = user_id,
                            key = idempotency_key,
                            amount,
                            error = %e,
                            "credit failed after {} attempts; requires reconciliation",
                            attempt
                        );
                        return;
                    }
                    self.metrics.settlement_retries.inc();
                    tracing::warn!(
                        user = user_id,
                        key = idempotency_key,
                        attempt,
                        error = %e,
                        "credit failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.credit_retry_backoff_ms))
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::CoinFace;
    use crate::history::{BroadcastFanout, InMemoryHistory};
    use crate::ledger::InMemoryLedger;

    fn bridge(ledger: Arc<InMemoryLedger>, history: Arc<InMemoryHistory>) -> SettlementBridge {
        SettlementBridge::new(
            ledger,
            history,
            Arc::new(BroadcastFanout::new(16)),
            Arc::new(EngineMetrics::new().unwrap()),
            SettlementConfig {
                credit_retry_attempts: 3,
                credit_retry_backoff_ms: 1,
            },
        )
    }

    fn sample_settlement(payout: f64) -> Settlement {
        Settlement {
            entity_id: Uuid::new_v4(),
            game: GameType::CoinFlip,
            user_id: Some("u1".to_string()),
            stake: 10.0,
            currency: Currency::usd(),
            payout,
            multiplier: if payout > 0.0 { payout / 10.0 } else { 0.0 },
            detail: OutcomeDetail::Coin {
                pick: CoinFace::Heads,
                face: CoinFace::Heads,
            },
            seed: RevealMaterial {
                server_seed: "seed".to_string(),
                server_seed_hash: "hash".to_string(),
                client_seed: "client".to_string(),
                nonce: 3,
            },
        }
    }

    #[test]
    fn payout_truncates_to_cents() {
        assert_eq!(SettlementBridge::payout_for(10.0, 2.0), 20.0);
        assert_eq!(SettlementBridge::payout_for(1.0, 1.9999), 1.99);
    }

    #[tokio::test]
    async fn win_credits_and_records() {
        let ledger = Arc::new(InMemoryLedger::new());
        let history = Arc::new(InMemoryHistory::new());
        let bridge = bridge(ledger.clone(), history.clone());

        let record = bridge.settle(sample_settlement(20.0)).await.unwrap();
        assert_eq!(record.payout, 20.0);
        assert_eq!(record.nonce, 3);
        assert_eq!(
            ledger.balance("u1", &Currency::usd()).await.unwrap(),
            20.0
        );
        assert_eq!(history.recent("u1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn loss_records_without_credit() {
        let ledger = Arc::new(InMemoryLedger::new());
        let history = Arc::new(InMemoryHistory::new());
        let bridge = bridge(ledger.clone(), history.clone());

        bridge.settle(sample_settlement(0.0)).await.unwrap();
        assert_eq!(ledger.balance("u1", &Currency::usd()).await.unwrap(), 0.0);
        assert_eq!(history.recent("u1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transient_credit_failure_is_retried_once_applied() {
        let ledger = Arc::new(InMemoryLedger::new());
        let history = Arc::new(InMemoryHistory::new());
        let bridge = bridge(ledger.clone(), history.clone());

        ledger.fail_next_credits(1);
        bridge.settle(sample_settlement(20.0)).await.unwrap();
        assert_eq!(
            ledger.balance("u1", &Currency::usd()).await.unwrap(),
            20.0
        );
    }

    #[tokio::test]
    async fn repeated_settlement_of_same_entity_credits_once() {
        // The owner's active flag normally prevents this; the idempotency
        // key is the second line of defense.
        let ledger = Arc::new(InMemoryLedger::new());
        let history = Arc::new(InMemoryHistory::new());
        let bridge = bridge(ledger.clone(), history.clone());

        let settlement = sample_settlement(20.0);
        bridge.settle(settlement.clone()).await.unwrap();
        bridge.settle(settlement).await.unwrap();

        assert_eq!(
            ledger.balance("u1", &Currency::usd()).await.unwrap(),
            20.0
        );
    }
}
