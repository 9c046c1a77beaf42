//! Per-user stepped session orchestration.
//!
//! One engine drives every session game, dispatching on the game tag for
//! layout and step rules. All mutation happens under the store's per-key
//! lock, so a user's session is serialized against itself while distinct
//! users run fully in parallel.

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult, RejectReason};
use crate::games::types::{
    GameType, SessionRecord, SessionStartRequest, SessionState, SessionView, SeedSnapshot,
};
use crate::games::{mines, towers};
use crate::history::{EngineEvent, Fanout, OutcomeDetail, topics};
use crate::ledger::{Ledger, LedgerError};
use crate::metrics::EngineMetrics;
use crate::rng;
use crate::seeds::SeedRegistry;
use crate::settlement::{RevealMaterial, Settlement, SettlementBridge};
use crate::store::SessionStore;
use crate::validate::StakeValidator;
use std::sync::Arc;
use uuid::Uuid;

pub struct SessionEngine {
    config: Arc<EngineConfig>,
    validator: Arc<StakeValidator>,
    registry: Arc<dyn SeedRegistry>,
    ledger: Arc<dyn Ledger>,
    store: Arc<SessionStore>,
    settlement: Arc<SettlementBridge>,
    fanout: Arc<dyn Fanout>,
    metrics: Arc<EngineMetrics>,
}

impl SessionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<EngineConfig>,
        validator: Arc<StakeValidator>,
        registry: Arc<dyn SeedRegistry>,
        ledger: Arc<dyn Ledger>,
        store: Arc<SessionStore>,
        settlement: Arc<SettlementBridge>,
        fanout: Arc<dyn Fanout>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            config,
            validator,
            registry,
            ledger,
            store,
            settlement,
            fanout,
            metrics,
        }
    }

    /// Start a stepped session: validate, debit (fail closed), draw the
    /// layout from a freshly issued nonce, and persist the record.
    pub async fn start(&self, request: SessionStartRequest) -> EngineResult<SessionView> {
        if !request.game.is_stepped() {
            return Err(EngineError::Infrastructure(format!(
                "{} is not a session game",
                request.game
            )));
        }

        let limits = match request.game {
            GameType::Mines => self.config.mines.limits,
            _ => self.config.towers.limits,
        };
        self.validator
            .validate(&request.user_id, request.stake, &request.currency, &limits)?;

        // Holding the key's lock across start makes the one-session-per-user
        // check atomic with the insert.
        let mut guard = self.store.acquire(&request.user_id, request.game).await;
        if guard.get().map_or(false, |r| !r.state.is_terminal()) {
            return Err(RejectReason::SessionInProgress(request.game).into());
        }

        // Request parameters are checked before a nonce is consumed.
        let hazards = request.hazards.unwrap_or(self.config.mines.default_hazards);
        if request.game == GameType::Mines
            && (hazards == 0 || hazards >= self.config.mines.slots)
        {
            return Err(RejectReason::PositionOutOfRange {
                position: hazards,
                max: self.config.mines.slots - 1,
            }
            .into());
        }

        let issued = self.registry.issue(&request.user_id)?;
        let layout = match request.game {
            GameType::Mines => {
                let floats = rng::derive(
                    &issued.server_seed,
                    &issued.client_seed,
                    issued.nonce,
                    mines::floats_needed(hazards),
                )
                .map_err(|e| EngineError::Infrastructure(e.to_string()))?;
                mines::layout(&floats, self.config.mines.slots, hazards)
            }
            _ => {
                let floats = rng::derive(
                    &issued.server_seed,
                    &issued.client_seed,
                    issued.nonce,
                    towers::floats_needed(&self.config.towers),
                )
                .map_err(|e| EngineError::Infrastructure(e.to_string()))?;
                towers::layout(&floats, &self.config.towers)
            }
        };

        match self
            .ledger
            .debit(&request.user_id, request.stake, &request.currency)
            .await
        {
            Ok(()) => {}
            Err(LedgerError::InsufficientFunds) => return Err(EngineError::InsufficientFunds),
            // An unconfirmable debit fails the start closed: nothing stored.
            Err(e) => return Err(EngineError::Infrastructure(e.to_string())),
        }

        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            game: request.game,
            stake: request.stake,
            currency: request.currency.clone(),
            layout,
            revealed: Vec::new(),
            progress: 0,
            multiplier: 1.0,
            state: SessionState::Active,
            payout: 0.0,
            server_seed: issued.server_seed.clone(),
            seed: SeedSnapshot {
                server_seed_hash: issued.server_seed_hash.clone(),
                client_seed: issued.client_seed.clone(),
                nonce: issued.nonce,
            },
            started_at: chrono::Utc::now().timestamp_millis(),
        };

        self.metrics.bets_placed.inc();
        self.metrics.wagered_total.inc_by(request.stake);
        tracing::info!(
            user = %request.user_id,
            game = %request.game,
            stake = request.stake,
            nonce = issued.nonce,
            "session started"
        );

        let view = SessionView::of(&record);
        guard.set(record);
        Ok(view)
    }

    /// Advance a session by one step (reveal a tile, climb a row).
    pub async fn step(
        &self,
        user_id: &str,
        game: GameType,
        position: u32,
    ) -> EngineResult<SessionView> {
        let mut guard = self.store.acquire(user_id, game).await;
        let record = guard
            .get_mut()
            .filter(|r| !r.state.is_terminal())
            .ok_or(RejectReason::NoActiveSession(game))?;

        match game {
            GameType::Mines => mines::step(record, position, &self.config.mines)?,
            GameType::Towers => towers::step(record, position, &self.config.towers)?,
            _ => return Err(RejectReason::NoActiveSession(game).into()),
        }

        if record.state.is_terminal() {
            let payout = match record.state {
                SessionState::Completed => {
                    SettlementBridge::payout_for(record.stake, record.multiplier)
                }
                _ => 0.0,
            };
            record.payout = payout;
            let view = self.settle_terminal(record.clone()).await?;
            guard.clear();
            drop(guard);
            self.store.remove(user_id, game);
            return Ok(view);
        }

        Ok(SessionView::of(record))
    }

    /// Cash a session out at its current running multiplier. Accepted only
    /// while ACTIVE with at least one safe step taken.
    pub async fn cash_out(&self, user_id: &str, game: GameType) -> EngineResult<SessionView> {
        let mut guard = self.store.acquire(user_id, game).await;
        let record = guard
            .get_mut()
            .filter(|r| !r.state.is_terminal())
            .ok_or(RejectReason::NoActiveSession(game))?;

        if record.progress == 0 {
            return Err(RejectReason::CashOutUnavailable.into());
        }

        record.state = SessionState::CashedOut;
        record.payout = SettlementBridge::payout_for(record.stake, record.multiplier);

        let view = self.settle_terminal(record.clone()).await?;
        guard.clear();
        drop(guard);
        self.store.remove(user_id, game);
        Ok(view)
    }

    /// The caller's live session, if any. The layout stays hidden.
    pub async fn active(&self, user_id: &str, game: GameType) -> Option<SessionView> {
        self.store
            .peek(user_id, game)
            .await
            .filter(|r| !r.state.is_terminal())
            .map(|r| SessionView::of(&r))
    }

    /// Settle an expired ACTIVE session collected by the TTL sweep: the
    /// stake was debited at start and is forfeited, never auto-recredited.
    pub async fn reconcile_expired(&self, mut record: SessionRecord) -> EngineResult<()> {
        if record.state.is_terminal() {
            return Ok(());
        }
        record.state = SessionState::Busted;
        record.payout = 0.0;

        tracing::warn!(
            user = %record.user_id,
            game = %record.game,
            session = %record.id,
            progress = record.progress,
            "expired session forfeited"
        );
        self.metrics.sessions_expired.inc();

        let settlement = Settlement {
            entity_id: record.id,
            game: record.game,
            user_id: Some(record.user_id.clone()),
            stake: record.stake,
            currency: record.currency.clone(),
            payout: 0.0,
            multiplier: 0.0,
            detail: OutcomeDetail::Forfeit {
                progress: record.progress,
            },
            seed: RevealMaterial {
                server_seed: record.server_seed.clone(),
                server_seed_hash: record.seed.server_seed_hash.clone(),
                client_seed: record.seed.client_seed.clone(),
                nonce: record.seed.nonce,
            },
        };
        self.settlement.settle(settlement).await?;

        self.fanout.publish(
            topics::SETTLEMENTS,
            EngineEvent::SessionSettled {
                user_id: record.user_id.clone(),
                game: record.game,
                state: SessionState::Busted,
                payout: 0.0,
            },
        );
        Ok(())
    }

    async fn settle_terminal(&self, record: SessionRecord) -> EngineResult<SessionView> {
        let settlement = Settlement {
            entity_id: record.id,
            game: record.game,
            user_id: Some(record.user_id.clone()),
            stake: record.stake,
            currency: record.currency.clone(),
            payout: record.payout,
            multiplier: record.multiplier,
            detail: OutcomeDetail::Session {
                state: record.state,
                progress: record.progress,
                layout: record.layout.clone(),
            },
            seed: RevealMaterial {
                server_seed: record.server_seed.clone(),
                server_seed_hash: record.seed.server_seed_hash.clone(),
                client_seed: record.seed.client_seed.clone(),
                nonce: record.seed.nonce,
            },
        };
        self.settlement.settle(settlement).await?;

        self.fanout.publish(
            topics::SETTLEMENTS,
            EngineEvent::SessionSettled {
                user_id: record.user_id.clone(),
                game: record.game,
                state: record.state,
                payout: record.payout,
            },
        );

        tracing::info!(
            user = %record.user_id,
            game = %record.game,
            state = ?record.state,
            payout = record.payout,
            "session settled"
        );

        Ok(SessionView::of(&record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, SettlementConfig};
    use crate::games::types::{Currency, SessionLayout};
    use crate::history::{BroadcastFanout, HistoryStore, InMemoryHistory};
    use crate::ledger::InMemoryLedger;
    use crate::seeds::InMemorySeedRegistry;
    use crate::validate::AllowAll;
    use std::time::Duration;

    struct Harness {
        engine: SessionEngine,
        ledger: Arc<InMemoryLedger>,
        history: Arc<InMemoryHistory>,
        store: Arc<SessionStore>,
    }

    fn harness() -> Harness {
        let config = Arc::new(EngineConfig::default());
        let ledger = Arc::new(InMemoryLedger::new());
        let history = Arc::new(InMemoryHistory::new());
        let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let fanout = Arc::new(BroadcastFanout::new(64));
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let settlement = Arc::new(SettlementBridge::new(
            ledger.clone(),
            history.clone(),
            fanout.clone(),
            metrics.clone(),
            SettlementConfig {
                credit_retry_attempts: 3,
                credit_retry_backoff_ms: 1,
            },
        ));

        let engine = SessionEngine::new(
            config.clone(),
            Arc::new(StakeValidator::new(&config.currencies, Arc::new(AllowAll))),
            Arc::new(InMemorySeedRegistry::new()),
            ledger.clone(),
            store.clone(),
            settlement,
            fanout,
            metrics,
        );

        Harness {
            engine,
            ledger,
            history,
            store,
        }
    }

    fn mines_request(user: &str, stake: f64) -> SessionStartRequest {
        SessionStartRequest {
            user_id: user.to_string(),
            game: GameType::Mines,
            stake,
            currency: Currency::usd(),
            hazards: None,
        }
    }

    #[tokio::test]
    async fn start_debits_the_stake_and_hides_the_layout() {
        let h = harness();
        h.ledger.deposit("u1", 100.0, &Currency::usd());

        let view = h.engine.start(mines_request("u1", 10.0)).await.unwrap();
        assert_eq!(view.state, SessionState::Active);
        assert!(view.layout.is_none());
        assert_eq!(
            h.ledger.balance("u1", &Currency::usd()).await.unwrap(),
            90.0
        );
    }

    #[tokio::test]
    async fn start_fails_closed_on_insufficient_funds() {
        let h = harness();
        h.ledger.deposit("u1", 1.0, &Currency::usd());

        match h.engine.start(mines_request("u1", 10.0)).await {
            Err(EngineError::InsufficientFunds) => {}
            other => panic!("expected insufficient funds, got {:?}", other),
        }
        assert!(h.engine.active("u1", GameType::Mines).await.is_none());
        assert_eq!(h.ledger.balance("u1", &Currency::usd()).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn second_concurrent_session_is_rejected() {
        let h = harness();
        h.ledger.deposit("u1", 100.0, &Currency::usd());

        h.engine.start(mines_request("u1", 10.0)).await.unwrap();
        match h.engine.start(mines_request("u1", 10.0)).await {
            Err(EngineError::Rejected(RejectReason::SessionInProgress(_))) => {}
            other => panic!("expected session-in-progress, got {:?}", other),
        }
        // Only the first stake was taken.
        assert_eq!(
            h.ledger.balance("u1", &Currency::usd()).await.unwrap(),
            90.0
        );
    }

    #[tokio::test]
    async fn busting_settles_as_a_loss_and_frees_the_slot() {
        let h = harness();
        h.ledger.deposit("u1", 100.0, &Currency::usd());
        h.engine.start(mines_request("u1", 10.0)).await.unwrap();

        // Find a hazard from the stored layout and step on it.
        let record = h.store.peek("u1", GameType::Mines).await.unwrap();
        let SessionLayout::Mines { ref hazards, .. } = record.layout else {
            panic!("expected mines layout");
        };
        let hazard = hazards[0];

        let view = h.engine.step("u1", GameType::Mines, hazard).await.unwrap();
        assert_eq!(view.state, SessionState::Busted);
        assert_eq!(view.payout, 0.0);
        // The terminal response exposes the full hazard layout.
        assert!(view.layout.is_some());

        assert!(h.engine.active("u1", GameType::Mines).await.is_none());
        assert_eq!(h.history.recent("u1", 10).await.unwrap().len(), 1);
        // The freed slot accepts a new session.
        h.engine.start(mines_request("u1", 10.0)).await.unwrap();
    }

    #[tokio::test]
    async fn cash_out_pays_the_running_multiplier() {
        let h = harness();
        h.ledger.deposit("u1", 100.0, &Currency::usd());
        h.engine.start(mines_request("u1", 10.0)).await.unwrap();

        let record = h.store.peek("u1", GameType::Mines).await.unwrap();
        let SessionLayout::Mines { ref hazards, slots } = record.layout else {
            panic!("expected mines layout");
        };
        let safe = (0..slots).find(|p| !hazards.contains(p)).unwrap();

        let stepped = h.engine.step("u1", GameType::Mines, safe).await.unwrap();
        assert_eq!(stepped.progress, 1);

        let view = h.engine.cash_out("u1", GameType::Mines).await.unwrap();
        assert_eq!(view.state, SessionState::CashedOut);
        assert_eq!(view.payout, SettlementBridge::payout_for(10.0, stepped.multiplier));
        assert_eq!(
            h.ledger.balance("u1", &Currency::usd()).await.unwrap(),
            90.0 + view.payout
        );
    }

    #[tokio::test]
    async fn cash_out_requires_progress() {
        let h = harness();
        h.ledger.deposit("u1", 100.0, &Currency::usd());
        h.engine.start(mines_request("u1", 10.0)).await.unwrap();

        match h.engine.cash_out("u1", GameType::Mines).await {
            Err(EngineError::Rejected(RejectReason::CashOutUnavailable)) => {}
            other => panic!("expected cashout-unavailable, got {:?}", other),
        }
        // Session is still live.
        assert!(h.engine.active("u1", GameType::Mines).await.is_some());
    }

    #[tokio::test]
    async fn steps_after_terminal_are_rejected() {
        let h = harness();
        h.ledger.deposit("u1", 100.0, &Currency::usd());
        h.engine.start(mines_request("u1", 10.0)).await.unwrap();

        let record = h.store.peek("u1", GameType::Mines).await.unwrap();
        let SessionLayout::Mines { ref hazards, .. } = record.layout else {
            panic!("expected mines layout");
        };
        h.engine
            .step("u1", GameType::Mines, hazards[0])
            .await
            .unwrap();

        match h.engine.step("u1", GameType::Mines, 0).await {
            Err(EngineError::Rejected(RejectReason::NoActiveSession(_))) => {}
            other => panic!("expected no-active-session, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reconcile_expired_forfeits_without_credit() {
        let h = harness();
        h.ledger.deposit("u1", 100.0, &Currency::usd());
        h.engine.start(mines_request("u1", 10.0)).await.unwrap();

        let record = h.store.peek("u1", GameType::Mines).await.unwrap();
        h.engine.reconcile_expired(record).await.unwrap();

        // Stake stays debited; a loss record exists.
        assert_eq!(
            h.ledger.balance("u1", &Currency::usd()).await.unwrap(),
            90.0
        );
        let records = h.history.recent("u1", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payout, 0.0);
    }

    #[tokio::test]
    async fn towers_session_runs_end_to_end() {
        let h = harness();
        h.ledger.deposit("u1", 100.0, &Currency::usd());

        let request = SessionStartRequest {
            user_id: "u1".to_string(),
            game: GameType::Towers,
            stake: 5.0,
            currency: Currency::usd(),
            hazards: None,
        };
        h.engine.start(request).await.unwrap();

        let record = h.store.peek("u1", GameType::Towers).await.unwrap();
        let SessionLayout::Towers {
            columns,
            ref hazard_rows,
        } = record.layout
        else {
            panic!("expected towers layout");
        };
        let safe_column = (0..columns).find(|c| !hazard_rows[0].contains(c)).unwrap();

        let view = h
            .engine
            .step("u1", GameType::Towers, safe_column)
            .await
            .unwrap();
        assert_eq!(view.progress, 1);
        assert_eq!(view.multiplier, 1.96);

        let cashed = h.engine.cash_out("u1", GameType::Towers).await.unwrap();
        assert_eq!(cashed.payout, SettlementBridge::payout_for(5.0, 1.96));
    }
}
