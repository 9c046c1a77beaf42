//! Error types for the fairplay game engine.
//!
//! The taxonomy follows the settlement discipline: expected rejections carry
//! stable codes and leave no partial state, funds problems surface before any
//! debit, infrastructure failures are retryable with idempotency keys, and
//! integrity failures halt the affected seed pair.

use crate::games::types::GameType;

/// Expected rejections of a player action. Surfaced to the caller with a
/// stable code, never retried automatically.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("round is not accepting bets")]
    RoundClosed,

    #[error("user already has a bet in this round")]
    DuplicateBet,

    #[error("no active bet to cash out")]
    NoActiveBet,

    #[error("cash-out is not available in the current phase")]
    CashOutUnavailable,

    #[error("user already has an active {0} session")]
    SessionInProgress(GameType),

    #[error("no active {0} session")]
    NoActiveSession(GameType),

    #[error("position {position} is out of range (max {max})")]
    PositionOutOfRange { position: u32, max: u32 },

    #[error("position {0} was already revealed")]
    PositionAlreadyRevealed(u32),

    #[error("stake {stake} is below the minimum bet {min}")]
    StakeBelowMinimum { stake: f64, min: f64 },

    #[error("stake {stake} exceeds the maximum bet {max}")]
    StakeAboveMaximum { stake: f64, max: f64 },

    #[error("auto cash-out {0} is below the minimum of 1.01")]
    InvalidAutoCashout(f64),

    #[error("currency {0} is not accepted")]
    UnsupportedCurrency(String),

    #[error("user is not permitted to wager")]
    WageringBlocked,

    #[error("bet or session was already settled")]
    AlreadySettled,
}

impl RejectReason {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::RoundClosed => "round_closed",
            RejectReason::DuplicateBet => "duplicate_bet",
            RejectReason::NoActiveBet => "no_active_bet",
            RejectReason::CashOutUnavailable => "cashout_unavailable",
            RejectReason::SessionInProgress(_) => "session_in_progress",
            RejectReason::NoActiveSession(_) => "no_active_session",
            RejectReason::PositionOutOfRange { .. } => "position_out_of_range",
            RejectReason::PositionAlreadyRevealed(_) => "position_already_revealed",
            RejectReason::StakeBelowMinimum { .. } => "stake_below_minimum",
            RejectReason::StakeAboveMaximum { .. } => "stake_above_maximum",
            RejectReason::InvalidAutoCashout(_) => "invalid_auto_cashout",
            RejectReason::UnsupportedCurrency(_) => "unsupported_currency",
            RejectReason::WageringBlocked => "wagering_blocked",
            RejectReason::AlreadySettled => "already_settled",
        }
    }
}

/// Integrity failures indicate tampering or an engine bug, never ordinary
/// player error. They halt further issuance on the affected seed pair.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntegrityError {
    #[error("server seed hash mismatch: committed {committed}, computed {computed}")]
    SeedHashMismatch { committed: String, computed: String },

    #[error("seed pair nonce desync: expected at most {expected}, got {actual}")]
    NonceDesync { expected: u64, actual: u64 },

    #[error("seed pair for user {0} is halted")]
    SeedPairHalted(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Root error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Expected rejection of a player action; no state was changed.
    #[error("rejected: {0}")]
    Rejected(#[from] RejectReason),

    /// Balance too low for the requested stake; surfaced before any debit.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// A collaborator (ledger, store) failed; settlements are retried with
    /// idempotency keys, debits fail closed.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    /// Seed material failed verification.
    #[error("integrity failure: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_codes_are_stable() {
        assert_eq!(RejectReason::RoundClosed.code(), "round_closed");
        assert_eq!(RejectReason::DuplicateBet.code(), "duplicate_bet");
        assert_eq!(
            RejectReason::PositionOutOfRange { position: 30, max: 24 }.code(),
            "position_out_of_range"
        );
    }

    #[test]
    fn rejections_convert_into_engine_errors() {
        let err: EngineError = RejectReason::WageringBlocked.into();
        match err {
            EngineError::Rejected(reason) => assert_eq!(reason.code(), "wagering_blocked"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn integrity_errors_carry_both_hashes() {
        let err = IntegrityError::SeedHashMismatch {
            committed: "aa".to_string(),
            computed: "bb".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("aa"));
        assert!(text.contains("bb"));
    }
}
