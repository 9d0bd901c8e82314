use crate::config::MatchConfig;
use crate::rules::DICE;
use serde::{Deserialize, Serialize};

pub type PlayerId = String;
pub type MatchId = u64;

/// Running total plus best single turn.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tally {
    pub total: u32,
    pub high: u32,
}

impl Tally {
    pub fn record(&mut self, points: u32) {
        self.total = self.total.saturating_add(points);
        self.high = self.high.max(points);
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStats {
    pub banked: Tally,
    pub lost: Tally,
    pub skipped: Tally,
    pub piggyback_banked: Tally,
    pub piggyback_lost: Tally,
    pub welfare_gained: Tally,
    pub welfare_lost: Tally,
    pub rolls: u32,
    pub folds: u32,
    pub finishes: u32,
    pub skips: u32,
    pub welfares: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub display: String,
    pub is_bot: bool,
    pub turn_order: u32,
    pub ready: bool,
    /// Banked points.
    pub score: u32,
    pub stats: PlayerStats,
}

impl Player {
    pub fn human(id: impl Into<PlayerId>, display: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display: display.into(),
            is_bot: false,
            turn_order: 0,
            ready: false,
            score: 0,
            stats: PlayerStats::default(),
        }
    }

    /// Bots sit down ready.
    pub fn bot(id: impl Into<PlayerId>, display: impl Into<String>) -> Self {
        Self { is_bot: true, ready: true, ..Self::human(id, display) }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", content = "dice", rename_all = "snake_case")]
pub enum Action {
    Ready,
    Keep(Vec<u8>),
    Finish(Vec<u8>),
    Concede,
    /// Fired by the hurry timer on behalf of the player who armed it.
    Hurry,
    NewDice,
    ContinueDice,
}

impl Action {
    /// Moves only the current player may make.
    pub fn is_turn_move(&self) -> bool {
        matches!(self, Action::Keep(_) | Action::Finish(_) | Action::NewDice | Action::ContinueDice)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Forming,
    AwaitingRoll,
    AwaitingKeep,
    AwaitingHighStakesChoice { dice_on_table: usize, pending_points: u32 },
    Ended { winner: PlayerId },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Endgame {
    #[default]
    Open,
    /// `leader` reached the goal first; play stops when the turn comes back
    /// around to them.
    FinalRound { leader: PlayerId },
}

impl Endgame {
    pub fn leader(&self) -> Option<&PlayerId> {
        match self {
            Endgame::Open => None,
            Endgame::FinalRound { leader } => Some(leader),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub player: PlayerId,
    pub rolls: Vec<u8>,
    /// Dice the next throw uses; 0 means a fresh six.
    pub dice_on_table: usize,
    pub points: u32,
    pub piggybacked: u32,
    pub roll_count: u32,
}

impl Turn {
    pub fn fresh(player: PlayerId) -> Self {
        Self { player, rolls: vec![], dice_on_table: 0, points: 0, piggybacked: 0, roll_count: 0 }
    }

    pub fn round_total(&self) -> u32 { self.points + self.piggybacked }

    pub fn dice_to_throw(&self) -> usize {
        if self.dice_on_table == 0 { DICE } else { self.dice_on_table }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Keep,
    Finish,
    Farkle,
    Skip,
    Welfare,
    Concede,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Standing {
    pub player: PlayerId,
    pub display: String,
    pub score: u32,
    pub turn_order: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TurnOrderDecided { order: Vec<PlayerId>, roll_offs: Vec<Vec<(PlayerId, u8)>> },
    DiceRolled { player: PlayerId, values: Vec<u8> },
    TurnResolved { kind: TurnKind, player: PlayerId, points: u32, kept: Vec<u8> },
    TurnAdvanced { player: PlayerId },
    HighStakesChoiceRequested { player: PlayerId, dice_on_table: usize, pending_points: u32 },
    WelfareTriggered { from: PlayerId, to: PlayerId, amount: u32 },
    LastTurnStarted { leader: PlayerId, score: u32 },
    MatchEnded { winner: PlayerId, standings: Vec<Standing> },
}

/// A player's row once they leave the active set.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub display: String,
    pub is_bot: bool,
    pub score: u32,
    pub stats: PlayerStats,
    pub conceded: bool,
    pub won: bool,
}

impl PlayerRecord {
    pub fn from_player(p: &Player, conceded: bool, won: bool) -> Self {
        Self {
            id: p.id.clone(),
            display: p.display.clone(),
            is_bot: p.is_bot,
            score: p.score,
            stats: p.stats.clone(),
            conceded,
            won,
        }
    }
}

/// Immutable snapshot of a finished match.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchHistory {
    pub id: MatchId,
    pub config: MatchConfig,
    pub winner: PlayerId,
    pub players: Vec<PlayerRecord>,
    pub rolls_thrown: u32,
}

impl MatchHistory {
    pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string(self) }
}
