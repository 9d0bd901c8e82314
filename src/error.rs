use crate::model::{MatchId, PlayerId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("it is {current}'s turn")]
    NotYourTurn { current: PlayerId },
    #[error("you cannot hurry yourself")]
    OwnTurn,
    #[error("those dice are not on the table")]
    DiceNotOnTable,
    #[error("the kept dice do not score")]
    NoScore,
    #[error("opening turn needs {threshold} points, {shortfall} short")]
    OpeningThreshold { threshold: u32, shortfall: u32 },
    #[error("that move is not available right now")]
    WrongPhase,
    #[error("player is not seated in this match")]
    UnknownPlayer,
    #[error("the match is over")]
    MatchOver,
    #[error("match state is inconsistent: {0}")]
    Invariant(String),
}

impl MoveError {
    /// Errors the boundary swallows instead of reporting to the player.
    pub fn is_silent(&self) -> bool {
        matches!(self, MoveError::UnknownPlayer | MoveError::MatchOver)
    }
}

/// Failure to reach a match actor.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ActorError {
    #[error("match {0} is no longer running")]
    Closed(MatchId),
}
