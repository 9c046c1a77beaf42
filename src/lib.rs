//! Fairplay - provably-fair game engine.
//!
//! The engine behind a gambling platform's games: commitment RNG with
//! commit/reveal seed pairs, a shared ascending-multiplier round driven by a
//! single actor, per-user stepped sessions (mines, towers), single-step games
//! (coin flip, cards), and exactly-once settlement against a ledger
//! collaborator. Platform concerns (auth, KYC, payments, HTTP) live outside;
//! the engine consumes them through traits.

pub mod config;
pub mod engine;
pub mod errors;
pub mod games;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod rng;
pub mod seeds;
pub mod settlement;
pub mod store;
pub mod validate;
pub mod verify;

pub use config::{ConfigLoader, EngineConfig};
pub use engine::{EngineBuilder, GameEngine};
pub use errors::{EngineError, EngineResult, IntegrityError, RejectReason};
pub use games::types::GameType;
