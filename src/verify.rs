//! Independent outcome verification.
//!
//! Given revealed seed material, recompute the commitment and the outcome
//! from scratch so a player can compare against what was shown at play time.
//! A hash mismatch is an integrity failure, not an ordinary rejection.

use crate::config::EngineConfig;
use crate::errors::{EngineResult, IntegrityError};
use crate::games::outcome;
use crate::games::types::{Card, CoinFace, GameType, SessionLayout};
use crate::games::{mines, towers};
use crate::rng;
use serde::{Deserialize, Serialize};

/// Revealed material to verify, as supplied by the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub game: GameType,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    /// Mines only: hazard count of the session being verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hazards: Option<u32>,
}

/// The independently recomputed outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VerifiedOutcome {
    Crash { crash_point: f64 },
    Layout { layout: SessionLayout },
    Coin { face: CoinFace },
    Card { card: Card },
}

/// Recompute the commitment and the outcome for revealed seed material.
pub fn verify(request: &VerifyRequest, config: &EngineConfig) -> EngineResult<VerifiedOutcome> {
    let computed = rng::seed_hash(&request.server_seed);
    if computed != request.server_seed_hash {
        return Err(IntegrityError::SeedHashMismatch {
            committed: request.server_seed_hash.clone(),
            computed,
        }
        .into());
    }

    let derive = |count: usize| {
        rng::derive(&request.server_seed, &request.client_seed, request.nonce, count)
            .map_err(|e| crate::errors::EngineError::Infrastructure(e.to_string()))
    };

    let outcome = match request.game {
        GameType::Crash => {
            let float = derive(1)?[0];
            VerifiedOutcome::Crash {
                crash_point: outcome::crash_point(
                    float,
                    config.crash.house_edge,
                    config.crash.min_multiplier,
                ),
            }
        }
        GameType::Mines => {
            let hazards = request.hazards.unwrap_or(config.mines.default_hazards);
            if hazards == 0 || hazards >= config.mines.slots {
                return Err(crate::errors::RejectReason::PositionOutOfRange {
                    position: hazards,
                    max: config.mines.slots - 1,
                }
                .into());
            }
            let floats = derive(mines::floats_needed(hazards))?;
            VerifiedOutcome::Layout {
                layout: mines::layout(&floats, config.mines.slots, hazards),
            }
        }
        GameType::Towers => {
            let floats = derive(towers::floats_needed(&config.towers))?;
            VerifiedOutcome::Layout {
                layout: towers::layout(&floats, &config.towers),
            }
        }
        GameType::CoinFlip => {
            let float = derive(1)?[0];
            VerifiedOutcome::Coin {
                face: outcome::coin_face(float),
            }
        }
        GameType::Cards => {
            let float = derive(1)?[0];
            VerifiedOutcome::Card {
                card: outcome::card(float),
            }
        }
    };

    Ok(outcome)
}
