//! Shared game types: game tags, currencies, bets, sessions, and the
//! request/response surface consumed by the thin API layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Supported game types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Crash,
    Mines,
    Towers,
    CoinFlip,
    Cards,
}

impl GameType {
    /// True for games driven by the per-user stepped session machine.
    pub fn is_stepped(&self) -> bool {
        matches!(self, GameType::Mines | GameType::Towers)
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Crash => write!(f, "crash"),
            GameType::Mines => write!(f, "mines"),
            GameType::Towers => write!(f, "towers"),
            GameType::CoinFlip => write!(f, "coinflip"),
            GameType::Cards => write!(f, "cards"),
        }
    }
}

/// Wager currency. Acceptance is decided against the configured list; the
/// engine performs no conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Currency(pub String);

impl Currency {
    pub fn new(code: &str) -> Self {
        Self(code.to_uppercase())
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coin face for the flip game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoinFace {
    Heads,
    Tails,
}

impl fmt::Display for CoinFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinFace::Heads => write!(f, "heads"),
            CoinFace::Tails => write!(f, "tails"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardColor {
    Red,
    Black,
}

/// A single playing card; rank 1 is the ace, 11-13 are jack/queen/king.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub suit: Suit,
    pub rank: u8,
}

impl Card {
    pub fn color(&self) -> CardColor {
        match self.suit {
            Suit::Diamonds | Suit::Hearts => CardColor::Red,
            Suit::Clubs | Suit::Spades => CardColor::Black,
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rank = match self.rank {
            1 => "A".to_string(),
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            n => n.to_string(),
        };
        let suit = match self.suit {
            Suit::Clubs => "♣",
            Suit::Diamonds => "♦",
            Suit::Hearts => "♥",
            Suit::Spades => "♠",
        };
        write!(f, "{}{}", rank, suit)
    }
}

/// One participant's wager in a shared round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetEntry {
    pub id: Uuid,
    pub user_id: String,
    pub stake: f64,
    pub currency: Currency,
    /// Multiplier at which the engine cashes the bet out automatically.
    pub auto_cashout: Option<f64>,
    /// Flips true -> false exactly once; payout is written only at that flip.
    pub is_active: bool,
    pub payout: f64,
    pub settled_at: Option<i64>,
}

impl BetEntry {
    pub fn new(user_id: &str, stake: f64, currency: Currency, auto_cashout: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            stake,
            currency,
            auto_cashout,
            is_active: true,
            payout: 0.0,
            settled_at: None,
        }
    }
}

/// Phase of the shared ascending-multiplier round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Waiting,
    Running,
    Crashed,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::Waiting => write!(f, "waiting"),
            RoundPhase::Running => write!(f, "running"),
            RoundPhase::Crashed => write!(f, "crashed"),
        }
    }
}

/// Client-visible view of the shared round. The crash point appears only
/// once the round has terminated; the seed hash is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_id: Uuid,
    pub round_number: u64,
    pub phase: RoundPhase,
    pub server_seed_hash: String,
    pub multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_seed: Option<String>,
    pub active_bets: usize,
    pub started_at: i64,
}

/// Terminal disposition of a stepped session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Busted,
    Completed,
    CashedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Active)
    }
}

/// Game-specific hazard layout. Never serialized to the client while the
/// session is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionLayout {
    Mines {
        slots: u32,
        hazards: Vec<u32>,
    },
    Towers {
        columns: u32,
        /// Hazardous columns, one inner vec per row from the bottom up.
        hazard_rows: Vec<Vec<u32>>,
    },
}

/// Seed material snapshot taken when a session starts. The raw server seed
/// stays in the registry until the pair is rotated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedSnapshot {
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// One user-owned stepped game in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub game: GameType,
    pub stake: f64,
    pub currency: Currency,
    pub layout: SessionLayout,
    /// Positions already played, in play order.
    pub revealed: Vec<u32>,
    /// Count of safe steps taken; only ever increases.
    pub progress: u32,
    /// Recomputed from scratch after every step; pure in (progress, layout).
    pub multiplier: f64,
    pub state: SessionState,
    pub payout: f64,
    /// Raw server seed backing this session's derivation. Kept for the
    /// settlement record; never serialized toward clients.
    #[serde(skip)]
    pub server_seed: String,
    pub seed: SeedSnapshot,
    pub started_at: i64,
}

/// Client-facing projection of a session: the layout is exposed only once
/// the session is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub game: GameType,
    pub stake: f64,
    pub currency: Currency,
    pub revealed: Vec<u32>,
    pub progress: u32,
    pub multiplier: f64,
    pub state: SessionState,
    pub payout: f64,
    pub seed: SeedSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<SessionLayout>,
}

impl SessionView {
    pub fn of(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            game: record.game,
            stake: record.stake,
            currency: record.currency.clone(),
            revealed: record.revealed.clone(),
            progress: record.progress,
            multiplier: record.multiplier,
            state: record.state,
            payout: record.payout,
            seed: record.seed.clone(),
            layout: record.state.is_terminal().then(|| record.layout.clone()),
        }
    }
}

/// Request to join the shared round during its WAITING phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashBetRequest {
    pub user_id: String,
    pub stake: f64,
    pub currency: Currency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_cashout: Option<f64>,
}

/// Receipt returned when a round bet is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetReceipt {
    pub bet_id: Uuid,
    pub round_id: Uuid,
    pub round_number: u64,
    pub server_seed_hash: String,
}

/// Result of a cash-out or settlement on a round bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledBet {
    pub bet_id: Uuid,
    pub multiplier: f64,
    pub payout: f64,
}

/// Request to start a stepped session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartRequest {
    pub user_id: String,
    pub game: GameType,
    pub stake: f64,
    pub currency: Currency,
    /// Mines only: hazard count; the configured default applies when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hazards: Option<u32>,
}

/// Player pick for single-step games.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InstantPick {
    Coin { face: CoinFace },
    Color { color: CardColor },
}

/// Request to play a single-step game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantPlayRequest {
    pub user_id: String,
    pub stake: f64,
    pub currency: Currency,
    pub pick: InstantPick,
}

/// Resolved single-step game, returned in the same call that accepted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantOutcome {
    pub record_id: Uuid,
    pub game: GameType,
    pub user_id: String,
    pub stake: f64,
    pub currency: Currency,
    pub payout: f64,
    pub won: bool,
    pub result: InstantResult,
    pub seed: SeedSnapshot,
}

/// What the single-step game actually produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InstantResult {
    Coin { face: CoinFace },
    Card { card: Card },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepped_games_are_tagged() {
        assert!(GameType::Mines.is_stepped());
        assert!(GameType::Towers.is_stepped());
        assert!(!GameType::Crash.is_stepped());
        assert!(!GameType::CoinFlip.is_stepped());
    }

    #[test]
    fn card_colors_follow_suits() {
        assert_eq!(Card { suit: Suit::Hearts, rank: 1 }.color(), CardColor::Red);
        assert_eq!(Card { suit: Suit::Spades, rank: 13 }.color(), CardColor::Black);
    }

    #[test]
    fn session_view_hides_layout_while_active() {
        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            game: GameType::Mines,
            stake: 1.0,
            currency: Currency::usd(),
            layout: SessionLayout::Mines { slots: 25, hazards: vec![1, 2, 3, 4, 5] },
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
        };

        assert!(SessionView::of(&record).layout.is_none());

        let mut busted = record;
        busted.state = SessionState::Busted;
        assert!(SessionView::of(&busted).layout.is_some());
    }

    #[test]
    fn bet_entry_starts_active_with_no_payout() {
        let bet = BetEntry::new("u1", 10.0, Currency::usd(), Some(2.0));
        assert!(bet.is_active);
        assert_eq!(bet.payout, 0.0);
        assert!(bet.settled_at.is_none());
    }
}
