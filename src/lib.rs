//! Farkle rules engine: scoring, the turn state machine, an AI planner, and a
//! per-match actor that serialises every command against one match.

pub mod actor;
pub mod bot;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod registry;
pub mod rng;
pub mod rules;
pub mod turn;

pub use actor::{MatchHandle, Origin, Outbound};
pub use config::{MatchConfig, ServiceConfig};
pub use error::{ActorError, MoveError};
pub use model::{Action, Event, MatchHistory, MatchId, Phase, Player, PlayerId};
pub use registry::Registry;
pub use turn::{Match, MatchState};
