//! Row-climb game: pick one column per row, avoid the trap, reach the top.

use crate::config::TowersConfig;
use crate::errors::{EngineResult, RejectReason};
use crate::games::outcome;
use crate::games::types::{SessionLayout, SessionRecord, SessionState};

/// Floats needed to draw the trap layout: `hazards_per_row` per row.
pub fn floats_needed(config: &TowersConfig) -> usize {
    (config.rows * config.hazards_per_row) as usize
}

/// Draw the per-row trap layout for a fresh session, bottom row first.
pub fn layout(floats: &[f64], config: &TowersConfig) -> SessionLayout {
    let per_row = config.hazards_per_row as usize;
    let hazard_rows = (0..config.rows as usize)
        .map(|row| {
            outcome::hazard_positions(
                &floats[row * per_row..(row + 1) * per_row],
                config.columns,
                config.hazards_per_row,
            )
        })
        .collect();

    SessionLayout::Towers {
        columns: config.columns,
        hazard_rows,
    }
}

/// Climb one row by choosing a column. A trapped column busts the session;
/// a safe one advances to the next row with the multiplier recomputed from
/// scratch. Reaching the top row completes the session.
pub fn step(record: &mut SessionRecord, column: u32, config: &TowersConfig) -> EngineResult<()> {
    let SessionLayout::Towers {
        columns,
        ref hazard_rows,
    } = record.layout
    else {
        return Err(RejectReason::NoActiveSession(record.game).into());
    };

    if column >= columns {
        return Err(RejectReason::PositionOutOfRange {
            position: column,
            max: columns - 1,
        }
        .into());
    }

    let row = record.progress as usize;
    let hit = hazard_rows
        .get(row)
        .map_or(false, |hazards| hazards.contains(&column));
    record.revealed.push(column);

    if hit {
        record.state = SessionState::Busted;
        record.multiplier = 0.0;
        return Ok(());
    }

    record.progress += 1;
    record.multiplier = outcome::towers_multiplier(
        columns,
        config.hazards_per_row,
        record.progress,
        config.house_edge,
        config.multiplier_precision,
    );

    if record.progress >= hazard_rows.len() as u32 {
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

    fn config() -> TowersConfig {
        TowersConfig::default()
    }

    fn session_with_rows(hazard_rows: Vec<Vec<u32>>) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            game: GameType::Towers,
            stake: 10.0,
            currency: Currency::usd(),
            layout: SessionLayout::Towers {
                columns: 2,
                hazard_rows,
            },
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

    #[test]
    fn one_safe_row_with_two_columns_pays_nearly_double() {
        // 2 columns, 1 hazard per row, 2% edge: (1/0.5)^1 * 0.98 = 1.96.
        let mut record = session_with_rows(vec![vec![1], vec![0]]);
        step(&mut record, 0, &config()).unwrap();

        assert_eq!(record.progress, 1);
        assert_eq!(record.multiplier, 1.96);
        assert_eq!(record.state, SessionState::Active);
    }

    #[test]
    fn trapped_column_busts_the_climb() {
        let mut record = session_with_rows(vec![vec![1], vec![0]]);
        step(&mut record, 1, &config()).unwrap();

        assert_eq!(record.state, SessionState::Busted);
        assert_eq!(record.multiplier, 0.0);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn reaching_the_top_completes_the_session() {
        let mut record = session_with_rows(vec![vec![1], vec![1]]);
        let config = config();

        step(&mut record, 0, &config).unwrap();
        step(&mut record, 0, &config).unwrap();

        assert_eq!(record.state, SessionState::Completed);
        assert_eq!(record.progress, 2);
        assert_eq!(record.multiplier, outcome::towers_multiplier(2, 1, 2, 0.02, 2));
    }

    #[test]
    fn out_of_range_column_is_rejected_without_state_change() {
        let mut record = session_with_rows(vec![vec![1]]);
        match step(&mut record, 5, &config()) {
            Err(EngineError::Rejected(RejectReason::PositionOutOfRange { position, max })) => {
                assert_eq!(position, 5);
                assert_eq!(max, 1);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(record.progress, 0);
        assert!(record.revealed.is_empty());
    }

    #[test]
    fn layout_draws_the_configured_hazards_per_row() {
        let config = config();
        let floats: Vec<f64> = (0..floats_needed(&config))
            .map(|i| (i as f64 + 0.5) / floats_needed(&config) as f64)
            .collect();

        let SessionLayout::Towers {
            columns,
            hazard_rows,
        } = layout(&floats, &config)
        else {
            panic!("expected towers layout");
        };

        assert_eq!(columns, config.columns);
        assert_eq!(hazard_rows.len(), config.rows as usize);
        for row in &hazard_rows {
            assert_eq!(row.len(), config.hazards_per_row as usize);
            assert!(row.iter().all(|&c| c < config.columns));
        }
    }
}
