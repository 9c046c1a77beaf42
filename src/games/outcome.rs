//! Pure outcome generators.
//!
//! Every function here maps already-derived floats to a game outcome; none of
//! them touch seeds, clocks, or state, so each is trivially testable with
//! fixed inputs. Curve shapes and edges arrive as parameters from config.

use crate::games::types::{Card, CoinFace, Suit};

/// Truncate toward zero at a fixed decimal precision.
///
/// Used on every payout path so the house never pays more than the
/// mathematically derived value. The epsilon guards the case where an exact
/// product (2 x 0.98 = 1.96) lands one ulp below the integer boundary after
/// scaling.
pub fn truncate(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    ((value * factor) + 1e-9).floor() / factor
}

/// Map one float to a crash multiplier via the inverse-distribution
/// transform `(1 - edge) / (1 - f)`, truncated to 2 decimals.
///
/// An `edge`-sized slice of the float range maps to `min_multiplier`
/// (instant crash); the remaining mass is heavy-tailed, so very large
/// multipliers are rare but possible.
pub fn crash_point(float: f64, house_edge: f64, min_multiplier: f64) -> f64 {
    debug_assert!((0.0..1.0).contains(&float));
    let raw = (1.0 - house_edge) / (1.0 - float);
    if raw <= min_multiplier {
        return truncate(min_multiplier, 2);
    }
    truncate(raw, 2)
}

/// Displayed multiplier of the shared round as a function of elapsed time:
/// smooth exponential growth, truncated to 2 decimals. Pure in elapsed time,
/// so repeated ticks can never accumulate drift.
pub fn display_multiplier(elapsed_ms: u64, growth_rate: f64) -> f64 {
    let seconds = elapsed_ms as f64 / 1000.0;
    truncate((growth_rate * seconds).exp(), 2)
}

/// Draw `hazards` distinct positions from `slots` using sequential floats
/// and an in-place shrinking candidate list. No retry loops: each float
/// consumes exactly one draw.
pub fn hazard_positions(floats: &[f64], slots: u32, hazards: u32) -> Vec<u32> {
    debug_assert!(hazards <= slots);
    debug_assert!(floats.len() >= hazards as usize);

    let mut candidates: Vec<u32> = (0..slots).collect();
    let mut picked = Vec::with_capacity(hazards as usize);

    for &f in floats.iter().take(hazards as usize) {
        let index = ((f * candidates.len() as f64) as usize).min(candidates.len() - 1);
        picked.push(candidates.swap_remove(index));
    }

    picked
}

/// Map one float to a coin face by range partitioning.
pub fn coin_face(float: f64) -> CoinFace {
    if float < 0.5 {
        CoinFace::Heads
    } else {
        CoinFace::Tails
    }
}

/// Map one float to one of the 52 cards by range partitioning:
/// index / 13 selects the suit, index % 13 the rank.
pub fn card(float: f64) -> Card {
    let index = ((float * 52.0) as u8).min(51);
    let suit = match index / 13 {
        0 => Suit::Clubs,
        1 => Suit::Diamonds,
        2 => Suit::Hearts,
        _ => Suit::Spades,
    };
    Card {
        suit,
        rank: index % 13 + 1,
    }
}

/// Closed-form mines multiplier after `progress` safe reveals on a grid of
/// `slots` with `hazards` mines: the product of per-reveal true odds times
/// `(1 - edge)`, recomputed from scratch and truncated.
pub fn mines_multiplier(
    slots: u32,
    hazards: u32,
    progress: u32,
    house_edge: f64,
    precision: u32,
) -> f64 {
    let safe = slots - hazards;
    let mut odds = 1.0;
    for i in 0..progress {
        odds *= (slots - i) as f64 / (safe - i) as f64;
    }
    truncate(odds * (1.0 - house_edge), precision)
}

/// Closed-form towers multiplier after `progress` climbed rows:
/// `(columns / safe_columns)^progress x (1 - edge)`, truncated.
pub fn towers_multiplier(
    columns: u32,
    hazards_per_row: u32,
    progress: u32,
    house_edge: f64,
    precision: u32,
) -> f64 {
    let safe = (columns - hazards_per_row) as f64;
    let odds = (columns as f64 / safe).powi(progress as i32);
    truncate(odds * (1.0 - house_edge), precision)
}
