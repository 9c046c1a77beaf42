//! Single-step games: coin flip and red/black card draw.
//!
//! Validate, debit, derive one float, settle, all in the call that accepted
//! the wager, through the same settlement bridge as every other game.

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::games::outcome;
use crate::games::types::{
    GameType, InstantOutcome, InstantPick, InstantPlayRequest, InstantResult, SeedSnapshot,
};
use crate::history::OutcomeDetail;
use crate::ledger::{Ledger, LedgerError};
use crate::metrics::EngineMetrics;
use crate::rng;
use crate::seeds::SeedRegistry;
use crate::settlement::{RevealMaterial, Settlement, SettlementBridge};
use crate::validate::StakeValidator;
use std::sync::Arc;
use uuid::Uuid;

pub struct InstantEngine {
    config: Arc<EngineConfig>,
    validator: Arc<StakeValidator>,
    registry: Arc<dyn SeedRegistry>,
    ledger: Arc<dyn Ledger>,
    settlement: Arc<SettlementBridge>,
    metrics: Arc<EngineMetrics>,
}

impl InstantEngine {
    pub fn new(
        config: Arc<EngineConfig>,
        validator: Arc<StakeValidator>,
        registry: Arc<dyn SeedRegistry>,
        ledger: Arc<dyn Ledger>,
        settlement: Arc<SettlementBridge>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            config,
            validator,
            registry,
            ledger,
            settlement,
            metrics,
        }
    }

    /// Play one single-step game to completion.
    pub async fn play(&self, request: InstantPlayRequest) -> EngineResult<InstantOutcome> {
        let game = match request.pick {
            InstantPick::Coin { .. } => GameType::CoinFlip,
            InstantPick::Color { .. } => GameType::Cards,
        };

        self.validator.validate(
            &request.user_id,
            request.stake,
            &request.currency,
            &self.config.instant.limits,
        )?;

        let issued = self.registry.issue(&request.user_id)?;
        let float = rng::derive_one(&issued.server_seed, &issued.client_seed, issued.nonce)
            .map_err(|e| EngineError::Infrastructure(e.to_string()))?;

        match self
            .ledger
            .debit(&request.user_id, request.stake, &request.currency)
            .await
        {
            Ok(()) => {}
            Err(LedgerError::InsufficientFunds) => return Err(EngineError::InsufficientFunds),
            Err(e) => return Err(EngineError::Infrastructure(e.to_string())),
        }

        self.metrics.bets_placed.inc();
        self.metrics.wagered_total.inc_by(request.stake);

        let (won, result, detail) = match request.pick {
            InstantPick::Coin { face: pick } => {
                let face = outcome::coin_face(float);
                (
                    face == pick,
                    InstantResult::Coin { face },
                    OutcomeDetail::Coin { pick, face },
                )
            }
            InstantPick::Color { color } => {
                let card = outcome::card(float);
                (
                    card.color() == color,
                    InstantResult::Card { card },
                    OutcomeDetail::Card { card },
                )
            }
        };

        // Even-odds games pay double the stake, shaved by the house edge.
        let multiplier = if won {
            outcome::truncate(2.0 * (1.0 - self.config.instant.house_edge), 2)
        } else {
            0.0
        };
        let payout = SettlementBridge::payout_for(request.stake, multiplier);

        let record_id = Uuid::new_v4();
        self.settlement
            .settle(Settlement {
                entity_id: record_id,
                game,
                user_id: Some(request.user_id.clone()),
                stake: request.stake,
                currency: request.currency.clone(),
                payout,
                multiplier,
                detail,
                seed: RevealMaterial {
                    server_seed: issued.server_seed.clone(),
                    server_seed_hash: issued.server_seed_hash.clone(),
                    client_seed: issued.client_seed.clone(),
                    nonce: issued.nonce,
                },
            })
            .await?;

        Ok(InstantOutcome {
            record_id,
            game,
            user_id: request.user_id,
            stake: request.stake,
            currency: request.currency,
            payout,
            won,
            result,
            seed: SeedSnapshot {
                server_seed_hash: issued.server_seed_hash,
                client_seed: issued.client_seed,
                nonce: issued.nonce,
            },
        })
    }
}
