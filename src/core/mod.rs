//! Core deterministic primitives.
//!
//! Everything the game logic needs that must behave identically across
//! platforms and replays lives here.

pub mod rng;

// Re-export core types
pub use rng::DeterministicRng;
