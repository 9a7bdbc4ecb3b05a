//! Network Layer
//!
//! Realtime WebSocket channel plus the HTTP move endpoint.
//! This layer is **non-deterministic** - all game rules run through `game/`.

pub mod protocol;
pub mod session;
pub mod hub;
pub mod matchmaking;
pub mod processor;
pub mod server;
pub mod http;

pub use protocol::{
    ActionError, ActionPayload, ActionSource, ClientMessage, ErrorData, ErrorType, ServerMessage,
};
pub use session::{ConnectionHandle, ConnectionId, SessionRegistry};
pub use hub::{SubscriptionHub, Subscriber};
pub use matchmaking::{MatchmakingQueue, QueueEntry};
pub use processor::{MoveProcessor, ProcessError};
pub use server::{GameServer, GameServerError, ServerConfig};
