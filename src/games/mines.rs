//! Hidden-hazard-grid game: reveal tiles, dodge the mines.

use crate::config::MinesConfig;
use crate::errors::{EngineResult, RejectReason};
use crate::games::outcome;
use crate::games::types::{SessionLayout, SessionRecord, SessionState};

/// Floats needed to draw a layout with `hazards` mines.
pub fn floats_needed(hazards: u32) -> usize {
    hazards as usize
}

/// Draw the hazard layout for a fresh session.
pub fn layout(floats: &[f64], slots: u32, hazards: u32) -> SessionLayout {
    SessionLayout::Mines {
        slots,
        hazards: outcome::hazard_positions(floats, slots, hazards),
    }
}

/// Safe reveals available before the board is exhausted.
pub fn max_progress(slots: u32, hazards: u32) -> u32 {
    slots - hazards
}

/// Reveal one tile. Mutates the record in place under the session lock:
/// a hazardous tile busts the session, a safe one advances progress and
/// recomputes the running multiplier from scratch.
pub fn step(record: &mut SessionRecord, position: u32, config: &MinesConfig) -> EngineResult<()> {
    let SessionLayout::Mines { slots, ref hazards } = record.layout else {
        return Err(RejectReason::NoActiveSession(record.game).into());
    };

    if position >= slots {
        return Err(RejectReason::PositionOutOfRange {
            position,
            max: slots - 1,
        }
        .into());
    }
    if record.revealed.contains(&position) {
        return Err(RejectReason::PositionAlreadyRevealed(position).into());
    }

    let hazard_count = hazards.len() as u32;
    let hit = hazards.contains(&position);
    record.revealed.push(position);

    if hit {
        record.state = SessionState::Busted;
        record.multiplier = 0.0;
        return Ok(());
    }

    record.progress += 1;
    record.multiplier = outcome::mines_multiplier(
        slots,
        hazard_count,
        record.progress,
        config.house_edge,
        config.multiplier_precision,
    );

    if record.progress >= max_progress(slots, hazard_count) {
        record.state = SessionState::Completed;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use crate::games::types::{Currency, GameType, SeedSnapshot};
    use uuid::Uuid;

    fn config() -> MinesConfig {
        MinesConfig::default()
    }

    fn session_with_hazards(hazards: Vec<u32>) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            game: GameType::Mines,
            stake: 10.0,
            currency: Currency::usd(),
            layout: SessionLayout::Mines { slots: 25, hazards },
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

    fn reject_code(result: EngineResult<()>) -> &'static str {
        match result {
            Err(EngineError::Rejected(reason)) => reason.code(),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn three_safe_reveals_match_the_closed_form() {
        let mut record = session_with_hazards(vec![20, 21, 22, 23, 24]);
        let config = config();

        for position in [0, 1, 2] {
            step(&mut record, position, &config).unwrap();
        }

        assert_eq!(record.progress, 3);
        assert_eq!(record.state, SessionState::Active);
        let expected = outcome::truncate(
            (25.0 / 20.0) * (24.0 / 19.0) * (23.0 / 18.0) * (1.0 - config.house_edge),
            config.multiplier_precision,
        );
        assert_eq!(record.multiplier, expected);
    }

    #[test]
    fn hazardous_reveal_busts_the_session() {
        let mut record = session_with_hazards(vec![20, 21, 22, 23, 24]);
        let config = config();

        for position in [0, 1, 2] {
            step(&mut record, position, &config).unwrap();
        }
        step(&mut record, 24, &config).unwrap();

        assert_eq!(record.state, SessionState::Busted);
        assert_eq!(record.multiplier, 0.0);
        assert_eq!(record.progress, 3);
        assert_eq!(record.revealed, vec![0, 1, 2, 24]);
    }

    #[test]
    fn out_of_range_and_repeat_positions_are_rejected() {
        let mut record = session_with_hazards(vec![20, 21, 22, 23, 24]);
        let config = config();

        assert_eq!(
            reject_code(step(&mut record, 25, &config)),
            "position_out_of_range"
        );

        step(&mut record, 3, &config).unwrap();
        assert_eq!(
            reject_code(step(&mut record, 3, &config)),
            "position_already_revealed"
        );
        // Rejections leave no partial state behind.
        assert_eq!(record.progress, 1);
        assert_eq!(record.revealed, vec![3]);
    }

    #[test]
    fn clearing_every_safe_tile_completes_the_session() {
        let mut record = session_with_hazards(vec![0, 1, 2]);
        if let SessionLayout::Mines { ref mut slots, .. } = record.layout {
            *slots = 5;
        }
        let config = config();

        step(&mut record, 3, &config).unwrap();
        assert_eq!(record.state, SessionState::Active);
        step(&mut record, 4, &config).unwrap();

        assert_eq!(record.state, SessionState::Completed);
        assert_eq!(record.progress, max_progress(5, 3));
    }

    #[test]
    fn progress_never_exceeds_the_safe_tile_count() {
        assert_eq!(max_progress(25, 5), 20);
        assert_eq!(max_progress(5, 3), 2);
    }
}
