//! Shared ascending-multiplier round.
//!
//! One actor task owns the live round. Every mutation (the clock tick,
//! bets, cash-outs, state queries) arrives through a single command queue,
//! so no two transitions can interleave and a stale cash-out can never race
//! the crash. Round throughput is bounded by the queue, which is acceptable
//! because a round's bet volume is naturally bounded.

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult, RejectReason};
use crate::games::outcome;
use crate::games::types::{
    BetEntry, BetReceipt, CrashBetRequest, GameType, RoundPhase, RoundSnapshot, SettledBet,
};
use crate::history::{EngineEvent, Fanout, OutcomeDetail, topics};
use crate::ledger::{Ledger, LedgerError};
use crate::metrics::EngineMetrics;
use crate::rng;
use crate::settlement::{RevealMaterial, Settlement, SettlementBridge};
use crate::validate::StakeValidator;
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Mints one server seed per round; replaced in tests for determinism.
type SeedMinter = dyn Fn(u64) -> String + Send;

enum Command {
    PlaceBet {
        request: CrashBetRequest,
        reply: oneshot::Sender<EngineResult<BetReceipt>>,
    },
    CashOut {
        user_id: String,
        reply: oneshot::Sender<EngineResult<SettledBet>>,
    },
    Snapshot {
        reply: oneshot::Sender<RoundSnapshot>,
    },
}

/// Cloneable handle to the round actor.
#[derive(Clone)]
pub struct RoundHandle {
    commands: mpsc::Sender<Command>,
}

fn actor_gone() -> EngineError {
    EngineError::Infrastructure("round actor unavailable".to_string())
}

impl RoundHandle {
    pub async fn place_bet(&self, request: CrashBetRequest) -> EngineResult<BetReceipt> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::PlaceBet { request, reply })
            .await
            .map_err(|_| actor_gone())?;
        rx.await.map_err(|_| actor_gone())?
    }

    pub async fn cash_out(&self, user_id: &str) -> EngineResult<SettledBet> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::CashOut {
                user_id: user_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| actor_gone())?;
        rx.await.map_err(|_| actor_gone())?
    }

    pub async fn snapshot(&self) -> EngineResult<RoundSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| actor_gone())?;
        rx.await.map_err(|_| actor_gone())
    }
}

/// Collaborators the round actor settles against.
pub struct RoundDeps {
    pub validator: Arc<StakeValidator>,
    pub ledger: Arc<dyn Ledger>,
    pub settlement: Arc<SettlementBridge>,
    pub fanout: Arc<dyn Fanout>,
    pub metrics: Arc<EngineMetrics>,
}

pub struct RoundActor {
    config: Arc<EngineConfig>,
    deps: RoundDeps,
    mint_seed: Box<SeedMinter>,

    round_id: Uuid,
    round_number: u64,
    phase: RoundPhase,
    server_seed: String,
    server_seed_hash: String,
    /// Precomputed from the committed seed; hidden until the crash.
    crash_point: f64,
    multiplier: f64,
    bets: Vec<BetEntry>,
    phase_deadline: Instant,
    run_started: Option<Instant>,
    started_at: i64,
}

fn mint_random_seed(_round_number: u64) -> String {
    let mut raw = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}

impl RoundActor {
    /// Spawn the round actor with random per-round seeds.
    pub fn spawn(config: Arc<EngineConfig>, deps: RoundDeps) -> RoundHandle {
        Self::spawn_with_minter(config, deps, Box::new(mint_random_seed))
    }

    pub(crate) fn spawn_with_minter(
        config: Arc<EngineConfig>,
        deps: RoundDeps,
        mint_seed: Box<SeedMinter>,
    ) -> RoundHandle {
        let (commands, rx) = mpsc::channel(256);

        let mut actor = Self {
            config,
            deps,
            mint_seed,
            round_id: Uuid::new_v4(),
            round_number: 0,
            phase: RoundPhase::Waiting,
            server_seed: String::new(),
            server_seed_hash: String::new(),
            crash_point: 1.0,
            multiplier: 1.0,
            bets: Vec::new(),
            phase_deadline: Instant::now(),
            run_started: None,
            started_at: 0,
        };
        actor.begin_round();

        tokio::spawn(actor.run(rx));
        RoundHandle { commands }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut tick =
            tokio::time::interval(Duration::from_millis(self.config.crash.tick_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe = commands.recv() => match maybe {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = tick.tick() => self.handle_tick().await,
            }
        }
    }

    /// Start a fresh round with a freshly committed seed. The round number
    /// doubles as the derivation nonce.
    fn begin_round(&mut self) {
        self.round_number += 1;
        self.round_id = Uuid::new_v4();
        self.server_seed = (self.mint_seed)(self.round_number);
        self.server_seed_hash = rng::seed_hash(&self.server_seed);
        self.crash_point = match rng::derive_one(
            &self.server_seed,
            &self.config.crash.client_seed,
            self.round_number,
        ) {
            Ok(float) => outcome::crash_point(
                float,
                self.config.crash.house_edge,
                self.config.crash.min_multiplier,
            ),
            Err(e) => {
                tracing::error!(error = %e, "crash point derivation failed; forcing minimum");
                self.config.crash.min_multiplier
            }
        };
        self.phase = RoundPhase::Waiting;
        self.multiplier = 1.0;
        self.bets.clear();
        self.run_started = None;
        self.started_at = chrono::Utc::now().timestamp_millis();
        self.phase_deadline =
            Instant::now() + Duration::from_millis(self.config.crash.betting_window_ms);

        tracing::info!(
            round = self.round_number,
            commitment = %self.server_seed_hash,
            "round open for bets"
        );
        self.publish_phase();
    }

    async fn handle_tick(&mut self) {
        match self.phase {
            RoundPhase::Waiting => {
                if Instant::now() >= self.phase_deadline {
                    self.phase = RoundPhase::Running;
                    self.run_started = Some(Instant::now());
                    self.multiplier = 1.0;
                    tracing::debug!(round = self.round_number, "round running");
                    self.publish_phase();
                }
            }
            RoundPhase::Running => self.advance().await,
            RoundPhase::Crashed => {
                if Instant::now() >= self.phase_deadline {
                    self.begin_round();
                }
            }
        }
    }

    /// One clock tick of the RUNNING phase: recompute the displayed
    /// multiplier, fire due auto-cash-outs, then check termination.
    async fn advance(&mut self) {
        let elapsed_ms = self
            .run_started
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.multiplier = outcome::display_multiplier(elapsed_ms, self.config.crash.growth_rate);

        self.deps.fanout.publish(
            topics::ROUND,
            EngineEvent::MultiplierTick {
                round_number: self.round_number,
                multiplier: self.multiplier.min(self.crash_point),
            },
        );

        // Auto-cash-outs settle before the termination check, clamped at the
        // crash point, so thresholds at or below it still win on the
        // terminating tick.
        let ceiling = self.multiplier.min(self.crash_point);
        for index in 0..self.bets.len() {
            let Some(threshold) = self.bets[index].auto_cashout else {
                continue;
            };
            if !self.bets[index].is_active || threshold > ceiling {
                continue;
            }
            if let Err(e) = self.settle_index(index, threshold, Some(threshold)).await {
                tracing::error!(error = %e, "auto cash-out settlement failed");
            }
        }

        if self.multiplier >= self.crash_point {
            self.crash().await;
        }
    }

    async fn crash(&mut self) {
        self.phase = RoundPhase::Crashed;
        self.multiplier = self.crash_point;
        tracing::info!(
            round = self.round_number,
            crash_point = self.crash_point,
            "round crashed"
        );

        for index in 0..self.bets.len() {
            if !self.bets[index].is_active {
                continue;
            }
            if let Err(e) = self.settle_index(index, 0.0, None).await {
                tracing::error!(error = %e, "loss settlement failed");
            }
        }

        if let Err(e) = self
            .deps
            .settlement
            .record_round_summary(
                self.round_id,
                self.round_number,
                self.crash_point,
                self.bets.len(),
                self.reveal(),
            )
            .await
        {
            tracing::error!(error = %e, "round summary append failed");
        }

        self.publish_phase();
        self.phase_deadline =
            Instant::now() + Duration::from_millis(self.config.crash.intermission_ms);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::PlaceBet { request, reply } => {
                let result = self.place_bet(request).await;
                let _ = reply.send(result);
            }
            Command::CashOut { user_id, reply } => {
                let result = self.cash_out(&user_id).await;
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn place_bet(&mut self, request: CrashBetRequest) -> EngineResult<BetReceipt> {
        if self.phase != RoundPhase::Waiting {
            return Err(RejectReason::RoundClosed.into());
        }
        if self.bets.iter().any(|b| b.user_id == request.user_id) {
            return Err(RejectReason::DuplicateBet.into());
        }
        if let Some(auto) = request.auto_cashout {
            if auto < 1.01 || !auto.is_finite() {
                return Err(RejectReason::InvalidAutoCashout(auto).into());
            }
        }
        self.deps.validator.validate(
            &request.user_id,
            request.stake,
            &request.currency,
            &self.config.crash.limits,
        )?;

        match self
            .deps
            .ledger
            .debit(&request.user_id, request.stake, &request.currency)
            .await
        {
            Ok(()) => {}
            Err(LedgerError::InsufficientFunds) => return Err(EngineError::InsufficientFunds),
            // An unconfirmable debit fails the bet closed: no entry recorded.
            Err(e) => return Err(EngineError::Infrastructure(e.to_string())),
        }

        let bet = BetEntry::new(
            &request.user_id,
            request.stake,
            request.currency,
            request.auto_cashout,
        );
        let receipt = BetReceipt {
            bet_id: bet.id,
            round_id: self.round_id,
            round_number: self.round_number,
            server_seed_hash: self.server_seed_hash.clone(),
        };

        self.deps.metrics.bets_placed.inc();
        self.deps.metrics.wagered_total.inc_by(bet.stake);
        self.deps.fanout.publish(
            topics::ROUND,
            EngineEvent::BetPlaced {
                round_number: self.round_number,
                user_id: bet.user_id.clone(),
                stake: bet.stake,
            },
        );
        tracing::info!(
            user = %bet.user_id,
            round = self.round_number,
            stake = bet.stake,
            "bet placed"
        );
        self.bets.push(bet);

        Ok(receipt)
    }

    /// Player-initiated cash-out at the current displayed multiplier.
    async fn cash_out(&mut self, user_id: &str) -> EngineResult<SettledBet> {
        if self.phase != RoundPhase::Running {
            return Err(RejectReason::CashOutUnavailable.into());
        }
        let index = self
            .bets
            .iter()
            .position(|b| b.user_id == user_id && b.is_active)
            .ok_or(RejectReason::NoActiveBet)?;

        // While RUNNING the displayed multiplier never exceeds the crash
        // point, so this settlement cannot overshoot it.
        let multiplier = self.multiplier;
        self.settle_index(index, multiplier, Some(multiplier)).await
    }

    /// Settle one bet exactly once: the active flag is checked and cleared
    /// before any ledger call, inside the actor's serialized context.
    async fn settle_index(
        &mut self,
        index: usize,
        multiplier: f64,
        cashed_out_at: Option<f64>,
    ) -> EngineResult<SettledBet> {
        {
            let bet = &mut self.bets[index];
            if !bet.is_active {
                return Err(RejectReason::AlreadySettled.into());
            }
            bet.is_active = false;
            bet.payout = if multiplier > 0.0 {
                SettlementBridge::payout_for(bet.stake, multiplier)
            } else {
                0.0
            };
            bet.settled_at = Some(chrono::Utc::now().timestamp_millis());
        }

        let bet = self.bets[index].clone();
        self.deps
            .settlement
            .settle(Settlement {
                entity_id: bet.id,
                game: GameType::Crash,
                user_id: Some(bet.user_id.clone()),
                stake: bet.stake,
                currency: bet.currency.clone(),
                payout: bet.payout,
                multiplier,
                detail: OutcomeDetail::Crash { cashed_out_at },
                seed: self.reveal(),
            })
            .await?;

        Ok(SettledBet {
            bet_id: bet.id,
            multiplier,
            payout: bet.payout,
        })
    }

    fn reveal(&self) -> RevealMaterial {
        RevealMaterial {
            server_seed: self.server_seed.clone(),
            server_seed_hash: self.server_seed_hash.clone(),
            client_seed: self.config.crash.client_seed.clone(),
            nonce: self.round_number,
        }
    }

    fn snapshot(&self) -> RoundSnapshot {
        let crashed = self.phase == RoundPhase::Crashed;
        RoundSnapshot {
            round_id: self.round_id,
            round_number: self.round_number,
            phase: self.phase,
            server_seed_hash: self.server_seed_hash.clone(),
            multiplier: self.multiplier,
            crash_point: crashed.then_some(self.crash_point),
            server_seed: crashed.then(|| self.server_seed.clone()),
            active_bets: self.bets.iter().filter(|b| b.is_active).count(),
            started_at: self.started_at,
        }
    }

    fn publish_phase(&self) {
        let crashed = self.phase == RoundPhase::Crashed;
        self.deps.fanout.publish(
            topics::ROUND,
            EngineEvent::RoundPhase {
                round_number: self.round_number,
                phase: self.phase,
                multiplier: self.multiplier,
                crash_point: crashed.then_some(self.crash_point),
            },
        );
    }
}
