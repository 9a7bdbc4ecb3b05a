//! Game Logic Module
//!
//! All rules for one Lost Cities match. Synchronous and free of I/O;
//! the network layer drives it through `GameState::apply`.
//!
//! ## Module Structure
//!
//! - `card`: card value types and deck construction
//! - `state`: the authoritative match aggregate
//! - `engine`: move validation and the turn/round/game-end machine
//! - `score`: expedition scoring
//! - `events`: events emitted by applied moves
//! - `view`: per-viewer redacted projections

pub mod card;
pub mod state;
pub mod engine;
pub mod score;
pub mod events;
pub mod view;

// Re-export key types
pub use card::{Card, CardId, CardKind, Color};
pub use state::{GameState, GameStatus, GameOptions, MatchId, PlayerId, TurnPhase};
pub use engine::{Move, RuleViolation};
pub use events::{DrawSource, GameEvent};
pub use view::GameView;
