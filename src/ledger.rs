//! Ledger collaborator: balance debits and idempotent credits.
//!
//! The engine treats ledger calls as blocking I/O behind this trait. Credits
//! carry an idempotency key so settlement retries apply at most once; a debit
//! that cannot be confirmed fails the bet closed.

use crate::games::types::Currency;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Balance-mutating collaborator owned by the wider platform.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Withdraw a stake. Fails with `InsufficientFunds` before any state
    /// change when the balance is too low.
    async fn debit(&self, user_id: &str, amount: f64, currency: &Currency)
        -> Result<(), LedgerError>;

    /// Deposit a payout. At most one credit is applied per idempotency key,
    /// however many times the call is retried.
    async fn credit(
        &self,
        user_id: &str,
        amount: f64,
        currency: &Currency,
        idempotency_key: &str,
    ) -> Result<(), LedgerError>;

    async fn balance(&self, user_id: &str, currency: &Currency) -> Result<f64, LedgerError>;
}

/// In-memory ledger used by tests and the demo binary. Supports injected
/// transient credit failures to exercise the settlement retry path.
pub struct InMemoryLedger {
    balances: DashMap<(String, String), f64>,
    applied_keys: DashMap<String, ()>,
    credit_failures_remaining: AtomicU32,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            applied_keys: DashMap::new(),
            credit_failures_remaining: AtomicU32::new(0),
        }
    }

    /// Seed a balance before play.
    pub fn deposit(&self, user_id: &str, amount: f64, currency: &Currency) {
        *self
            .balances
            .entry((user_id.to_string(), currency.code().to_string()))
            .or_insert(0.0) += amount;
    }

    /// Make the next `count` credit calls fail with a transient error.
    pub fn fail_next_credits(&self, count: u32) {
        self.credit_failures_remaining.store(count, Ordering::SeqCst);
    }

    fn key(user_id: &str, currency: &Currency) -> (String, String) {
        (user_id.to_string(), currency.code().to_string())
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn debit(
        &self,
        user_id: &str,
        amount: f64,
        currency: &Currency,
    ) -> Result<(), LedgerError> {
        let mut balance = self
            .balances
            .entry(Self::key(user_id, currency))
            .or_insert(0.0);
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        *balance -= amount;
        Ok(())
    }

    async fn credit(
        &self,
        user_id: &str,
        amount: f64,
        currency: &Currency,
        idempotency_key: &str,
    ) -> Result<(), LedgerError> {
        let remaining = self.credit_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .credit_failures_remaining
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(LedgerError::Unavailable("injected failure".to_string()));
        }

        // Duplicate keys are acknowledged without a second application.
        if self
            .applied_keys
            .insert(idempotency_key.to_string(), ())
            .is_some()
        {
            return Ok(());
        }

        *self
            .balances
            .entry(Self::key(user_id, currency))
            .or_insert(0.0) += amount;
        Ok(())
    }

    async fn balance(&self, user_id: &str, currency: &Currency) -> Result<f64, LedgerError> {
        Ok(self
            .balances
            .get(&Self::key(user_id, currency))
            .map(|b| *b)
            .unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn debit_rejects_overdraft_without_side_effects() {
        let ledger = InMemoryLedger::new();
        let usd = Currency::usd();
        ledger.deposit("u1", 5.0, &usd);

        assert_eq!(
            ledger.debit("u1", 10.0, &usd).await,
            Err(LedgerError::InsufficientFunds)
        );
        assert_eq!(ledger.balance("u1", &usd).await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn credit_is_idempotent_per_key() {
        let ledger = InMemoryLedger::new();
        let usd = Currency::usd();

        ledger.credit("u1", 20.0, &usd, "credit:abc").await.unwrap();
        ledger.credit("u1", 20.0, &usd, "credit:abc").await.unwrap();
        ledger.credit("u1", 20.0, &usd, "credit:def").await.unwrap();

        assert_eq!(ledger.balance("u1", &usd).await.unwrap(), 40.0);
    }

    #[tokio::test]
    async fn injected_credit_failures_are_transient() {
        let ledger = InMemoryLedger::new();
        let usd = Currency::usd();
        ledger.fail_next_credits(1);

        assert!(ledger.credit("u1", 1.0, &usd, "k1").await.is_err());
        assert!(ledger.credit("u1", 1.0, &usd, "k1").await.is_ok());
        assert_eq!(ledger.balance("u1", &usd).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn balances_are_per_currency() {
        let ledger = InMemoryLedger::new();
        ledger.deposit("u1", 10.0, &Currency::usd());
        ledger.deposit("u1", 3.0, &Currency::new("EUR"));

        assert_eq!(ledger.balance("u1", &Currency::usd()).await.unwrap(), 10.0);
        assert_eq!(
            ledger.balance("u1", &Currency::new("EUR")).await.unwrap(),
            3.0
        );
    }
}
