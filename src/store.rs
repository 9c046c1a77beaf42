//! Short-lived keyed storage for in-flight sessions.
//!
//! Each (user, game) key owns an async mutex, so two steps on one session
//! can never interleave while different users proceed fully in parallel.
//! Entries carry a TTL; expiry of an abandoned ACTIVE session is reconciled
//! by an explicit sweep (forfeit), never by the hot path.

use crate::errors::{EngineResult, RejectReason};
use crate::games::types::{GameType, SessionRecord};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type SessionKey = (String, GameType);

struct SessionSlot {
    record: Arc<AsyncMutex<Option<SessionRecord>>>,
    deadline: Mutex<Instant>,
}

impl SessionSlot {
    fn new(ttl: Duration) -> Self {
        Self {
            record: Arc::new(AsyncMutex::new(None)),
            deadline: Mutex::new(Instant::now() + ttl),
        }
    }

    fn refresh(&self, ttl: Duration) {
        *self.deadline.lock().expect("deadline mutex poisoned") = Instant::now() + ttl;
    }

    fn expired(&self) -> bool {
        *self.deadline.lock().expect("deadline mutex poisoned") <= Instant::now()
    }
}

/// Exclusive access to one session while a step or cash-out runs.
pub struct SessionGuard {
    guard: OwnedMutexGuard<Option<SessionRecord>>,
}

impl SessionGuard {
    pub fn get(&self) -> Option<&SessionRecord> {
        self.guard.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut SessionRecord> {
        self.guard.as_mut()
    }

    /// Store a fresh record under the held lock.
    pub fn set(&mut self, record: SessionRecord) {
        *self.guard = Some(record);
    }

    /// Drop the stored record; used when a session reaches a terminal state.
    pub fn clear(&mut self) {
        *self.guard = None;
    }
}

pub struct SessionStore {
    entries: DashMap<SessionKey, Arc<SessionSlot>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn slot(&self, user_id: &str, game: GameType) -> Arc<SessionSlot> {
        // Clone the Arc out so no DashMap guard is held across an await.
        self.entries
            .entry((user_id.to_string(), game))
            .or_insert_with(|| Arc::new(SessionSlot::new(self.ttl)))
            .clone()
    }

    /// Store a freshly started session. Rejects if the user already has a
    /// live session of this game type.
    pub async fn insert(&self, record: SessionRecord) -> EngineResult<()> {
        let slot = self.slot(&record.user_id, record.game);
        let mut stored = slot.record.clone().lock_owned().await;

        if stored.as_ref().map_or(false, |r| !r.state.is_terminal()) {
            return Err(RejectReason::SessionInProgress(record.game).into());
        }

        slot.refresh(self.ttl);
        *stored = Some(record);
        Ok(())
    }

    /// Acquire exclusive access to a user's session and refresh its TTL.
    pub async fn acquire(&self, user_id: &str, game: GameType) -> SessionGuard {
        let slot = self.slot(user_id, game);
        let guard = slot.record.clone().lock_owned().await;
        slot.refresh(self.ttl);
        SessionGuard { guard }
    }

    /// Read-only snapshot of a user's live session, if any.
    pub async fn peek(&self, user_id: &str, game: GameType) -> Option<SessionRecord> {
        let slot = self.entries.get(&(user_id.to_string(), game))?.clone();
        let stored = slot.record.clone().lock_owned().await;
        stored.clone()
    }

    /// Drop the map entry for a settled session.
    pub fn remove(&self, user_id: &str, game: GameType) {
        self.entries.remove(&(user_id.to_string(), game));
    }

    /// Remove and return expired ACTIVE sessions for reconciliation.
    ///
    /// Slots currently locked by an in-flight request are skipped; the
    /// request refreshes the TTL when it completes.
    pub fn collect_expired(&self) -> Vec<SessionRecord> {
        let mut expired_keys = Vec::new();
        for entry in self.entries.iter() {
            if entry.value().expired() {
                expired_keys.push(entry.key().clone());
            }
        }

        let mut collected = Vec::new();
        for key in expired_keys {
            let Some(slot) = self.entries.get(&key).map(|e| e.clone()) else {
                continue;
            };
            let Ok(mut stored) = slot.record.clone().try_lock_owned() else {
                continue;
            };
            if !slot.expired() {
                continue;
            }
            if let Some(record) = stored.take() {
                collected.push(record);
            }
            drop(stored);
            self.entries.remove(&key);
        }

        collected
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use crate::games::types::{Currency, SeedSnapshot, SessionLayout, SessionState};
    use uuid::Uuid;

    fn sample_session(user: &str) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            game: GameType::Mines,
            stake: 1.0,
            currency: Currency::usd(),
            layout: SessionLayout::Mines { slots: 25, hazards: vec![0, 1, 2, 3, 4] },
            revealed: vec![],
            progress: 0,
            multiplier: 1.0,
            state: SessionState::Active,
            payout: 0.0,
            server_seed: "seed".to_string(),
            seed: SeedSnapshot {
                server_seed_hash: "hash".to_string(),
                client_seed: "client".to_string(),
                nonce: 0,
            },
            started_at: 0,
        }
    }

    #[tokio::test]
    async fn one_live_session_per_user_and_game() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.insert(sample_session("u1")).await.unwrap();

        match store.insert(sample_session("u1")).await {
            Err(EngineError::Rejected(RejectReason::SessionInProgress(game))) => {
                assert_eq!(game, GameType::Mines)
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        // A different user is unaffected.
        store.insert(sample_session("u2")).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn acquire_serializes_access() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
        store.insert(sample_session("u1")).await.unwrap();

        let mut guard = store.acquire("u1", GameType::Mines).await;
        guard.get_mut().unwrap().progress = 1;

        // A second acquire must wait until the first guard drops.
        let store2 = store.clone();
        let waiter = tokio::spawn(async move {
            let guard = store2.acquire("u1", GameType::Mines).await;
            guard.get().unwrap().progress
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_active_sessions_are_collected_once() {
        let store = SessionStore::new(Duration::from_millis(10));
        store.insert(sample_session("u1")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let expired = store.collect_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].user_id, "u1");

        // Second sweep finds nothing; the entry is gone.
        assert!(store.collect_expired().is_empty());
        assert!(store.is_empty());
        assert!(store.peek("u1", GameType::Mines).await.is_none());
    }

    #[tokio::test]
    async fn live_sessions_survive_the_sweep() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.insert(sample_session("u1")).await.unwrap();
        assert!(store.collect_expired().is_empty());
        assert!(store.peek("u1", GameType::Mines).await.is_some());
    }

    #[tokio::test]
    async fn terminal_sessions_can_be_replaced() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.insert(sample_session("u1")).await.unwrap();

        {
            let mut guard = store.acquire("u1", GameType::Mines).await;
            guard.get_mut().unwrap().state = SessionState::Busted;
            guard.clear();
        }
        store.remove("u1", GameType::Mines);

        store.insert(sample_session("u1")).await.unwrap();
    }
}
