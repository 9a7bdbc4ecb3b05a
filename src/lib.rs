//! # Lost Cities Server
//!
//! Authoritative realtime server for two-player Lost Cities matches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   LOST CITIES SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Xorshift128+ PRNG and seed derivation     │
//! │                                                              │
//! │  game/           - Game rules (deterministic, no I/O)        │
//! │  ├── card.rs     - Cards, colors, deck construction          │
//! │  ├── state.rs    - The authoritative match aggregate         │
//! │  ├── engine.rs   - Move validation and turn/round machine    │
//! │  ├── score.rs    - Expedition scoring                        │
//! │  ├── events.rs   - Events emitted by applied moves           │
//! │  └── view.rs     - Per-viewer redacted projections           │
//! │                                                              │
//! │  store/          - GameRepository contract + in-memory store │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── protocol.rs - {event, data} wire messages               │
//! │  ├── session.rs  - Identity -> connection registry           │
//! │  ├── hub.rs      - Per-match subscription fan-out            │
//! │  ├── matchmaking.rs - FIFO pairing queue                     │
//! │  ├── processor.rs - Single write path for match state        │
//! │  ├── server.rs   - WebSocket accept loop and dispatch        │
//! │  └── http.rs     - POST /games/{id}/moves                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies in the rules
//! - All randomness from seeded Xorshift128+
//!
//! Given the same seed and move sequence, a match replays to the
//! identical state on any platform, which is what makes the
//! load-apply-save pipeline safe to restart at any point.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::{
    Card, CardId, Color, GameOptions, GameState, GameStatus, GameView, MatchId, Move, PlayerId,
    RuleViolation, TurnPhase,
};
pub use network::{GameServer, ServerConfig};
pub use store::{GameRepository, InMemoryGameStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
