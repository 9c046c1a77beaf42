//! Stake validation: bounds, currency acceptance, user standing.
//!
//! Validation is side-effect free and always runs before any ledger debit.
//! The user-standing check is delegated to an external collaborator; the
//! engine only consumes the verdict.

use crate::config::StakeLimits;
use crate::errors::{EngineResult, RejectReason};
use crate::games::types::Currency;
use std::collections::HashSet;

/// External user-status collaborator: banned, self-excluded, and
/// cooling-off users must not wager.
pub trait UserStatus: Send + Sync {
    fn can_wager(&self, user_id: &str) -> bool;
}

/// Permissive default used when the platform runs the engine standalone.
pub struct AllowAll;

impl UserStatus for AllowAll {
    fn can_wager(&self, _user_id: &str) -> bool {
        true
    }
}

pub struct StakeValidator {
    accepted_currencies: HashSet<String>,
    user_status: std::sync::Arc<dyn UserStatus>,
}

impl StakeValidator {
    pub fn new(currencies: &[String], user_status: std::sync::Arc<dyn UserStatus>) -> Self {
        Self {
            accepted_currencies: currencies.iter().map(|c| c.to_uppercase()).collect(),
            user_status,
        }
    }

    /// Check a wager against limits, currency acceptance, and user standing.
    /// Never mutates balance or session state.
    pub fn validate(
        &self,
        user_id: &str,
        stake: f64,
        currency: &Currency,
        limits: &StakeLimits,
    ) -> EngineResult<()> {
        if !self.user_status.can_wager(user_id) {
            return Err(RejectReason::WageringBlocked.into());
        }

        if !self.accepted_currencies.contains(currency.code()) {
            return Err(RejectReason::UnsupportedCurrency(currency.code().to_string()).into());
        }

        if stake < limits.min_bet || !stake.is_finite() {
            return Err(RejectReason::StakeBelowMinimum {
                stake,
                min: limits.min_bet,
            }
            .into());
        }

        if stake > limits.max_bet {
            return Err(RejectReason::StakeAboveMaximum {
                stake,
                max: limits.max_bet,
            }
            .into());
        }

        Ok(())
    }
}
