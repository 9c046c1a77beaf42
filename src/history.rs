//! Outcome records, the history store boundary, and realtime fan-out.
//!
//! Records are write-once and carry the full reveal material (seed, hash,
//! nonce, computed outcome) needed for independent verification. Fan-out is
//! best-effort: a dropped event never fails a settlement.

use crate::games::types::{
    Card, CoinFace, Currency, GameType, RoundPhase, SessionLayout, SessionState,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Game-specific payload of an outcome record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutcomeDetail {
    Crash {
        /// Present for cash-outs; losses settle with no cash-out value. The
        /// round's crash point lives in the round summary record.
        cashed_out_at: Option<f64>,
    },
    RoundSummary {
        round_number: u64,
        crash_point: f64,
        bets: usize,
    },
    Session {
        state: SessionState,
        progress: u32,
        layout: SessionLayout,
    },
    Coin {
        pick: CoinFace,
        face: CoinFace,
    },
    Card {
        card: Card,
    },
    /// Abandoned session reconciled by the TTL sweep.
    Forfeit {
        progress: u32,
    },
}

/// Immutable settlement record appended to the history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: Uuid,
    pub game: GameType,
    /// None for round summary records, which belong to no single user.
    pub user_id: Option<String>,
    pub stake: f64,
    /// None for round summary records.
    pub currency: Option<Currency>,
    pub payout: f64,
    pub multiplier: f64,
    pub detail: OutcomeDetail,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub created_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// Write-once history store collaborator.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a record. Records are never mutated afterward.
    async fn append(&self, record: OutcomeRecord) -> Result<(), HistoryError>;

    /// Most recent records for one user, newest first.
    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<OutcomeRecord>, HistoryError>;
}

/// In-memory history used by tests and the demo binary.
pub struct InMemoryHistory {
    by_user: DashMap<String, Vec<OutcomeRecord>>,
    all: Mutex<Vec<OutcomeRecord>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            by_user: DashMap::new(),
            all: Mutex::new(Vec::new()),
        }
    }

    /// Every record ever appended, in append order.
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.all.lock().expect("history mutex poisoned").clone()
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn append(&self, record: OutcomeRecord) -> Result<(), HistoryError> {
        if let Some(user_id) = &record.user_id {
            self.by_user
                .entry(user_id.clone())
                .or_default()
                .push(record.clone());
        }
        self.all
            .lock()
            .expect("history mutex poisoned")
            .push(record);
        Ok(())
    }

    async fn recent(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<OutcomeRecord>, HistoryError> {
        Ok(self
            .by_user
            .get(user_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Events published to the realtime layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RoundPhase {
        round_number: u64,
        phase: RoundPhase,
        multiplier: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        crash_point: Option<f64>,
    },
    MultiplierTick {
        round_number: u64,
        multiplier: f64,
    },
    BetPlaced {
        round_number: u64,
        user_id: String,
        stake: f64,
    },
    BetSettled {
        user_id: String,
        game: GameType,
        payout: f64,
        multiplier: f64,
    },
    SessionSettled {
        user_id: String,
        game: GameType,
        state: SessionState,
        payout: f64,
    },
}

/// Best-effort realtime fan-out collaborator. Publish failures are the
/// subscriber's problem, never the settlement's.
pub trait Fanout: Send + Sync {
    fn publish(&self, topic: &str, event: EngineEvent);
}

/// Fan-out over a tokio broadcast channel. Sends to a channel with no
/// subscribers simply drop, which is the desired best-effort behavior.
pub struct BroadcastFanout {
    sender: broadcast::Sender<(String, EngineEvent)>,
}

impl BroadcastFanout {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(String, EngineEvent)> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastFanout {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Fanout for BroadcastFanout {
    fn publish(&self, topic: &str, event: EngineEvent) {
        let _ = self.sender.send((topic.to_string(), event));
    }
}

/// Topic names used by the engine.
pub mod topics {
    pub const ROUND: &str = "round";
    pub const SETTLEMENTS: &str = "settlements";
}
