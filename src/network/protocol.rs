//! Protocol Messages
//!
//! Wire format for client-server communication. Every message is a JSON
//! envelope `{event, data}`; the same action payload is accepted over the
//! WebSocket channel and the HTTP move endpoint.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::card::{CardId, Color};
use crate::game::engine::{Move, RuleViolation};
use crate::game::state::{MatchId, PlayerId};
use crate::game::view::GameView;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join the matchmaking queue.
    FindMatch(FindMatchData),

    /// Leave the matchmaking queue.
    CancelMatch,

    /// Subscribe this connection to a match's updates.
    SubscribeGame(SubscribeGameData),

    /// Play a move in a match.
    GameAction(GameActionData),

    /// Request a full state resync (for reconnection).
    RequestGameState(RequestGameStateData),

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

/// Matchmaking entry request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMatchData {
    /// The identity queueing for a match.
    pub identity: PlayerId,
}

/// Subscription request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeGameData {
    /// Match to subscribe to.
    pub match_id: MatchId,
}

/// A move targeting one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameActionData {
    /// Target match.
    pub match_id: MatchId,
    /// The move itself, tagged on `action`.
    #[serde(flatten)]
    pub action: ActionPayload,
}

/// State resync request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestGameStateData {
    /// Match to resync.
    pub match_id: MatchId,
}

/// Where a `draw_card` action takes its card from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    /// Top of the draw pile.
    Deck,
    /// Top of one color's discard pile.
    DiscardPile,
}

/// The wire form of a move.
///
/// Tagged on `action`; a draw carries a `source` choosing between the
/// deck and a discard pile, with `color` naming the pile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionPayload {
    /// Play a card onto an expedition.
    #[serde(rename_all = "camelCase")]
    PlayCard { card_id: CardId, color: Color },
    /// Discard a card.
    #[serde(rename_all = "camelCase")]
    DiscardCard { card_id: CardId },
    /// Draw a card into hand.
    DrawCard {
        /// Deck or a discard pile.
        source: ActionSource,
        /// Which pile, when `source` is a discard pile.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<Color>,
    },
    /// Concede the game.
    Surrender,
}

/// A structurally invalid action payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActionError {
    /// A discard-pile draw did not name the pile.
    #[error("draw_card with source discard_pile requires a color")]
    MissingDiscardColor,
}

impl ActionPayload {
    /// Convert to the engine's move representation.
    pub fn into_move(self) -> Result<Move, ActionError> {
        match self {
            Self::PlayCard { card_id, color } => Ok(Move::PlayCard { card_id, color }),
            Self::DiscardCard { card_id } => Ok(Move::DiscardCard { card_id }),
            Self::DrawCard { source: ActionSource::Deck, .. } => Ok(Move::DrawFromDeck),
            Self::DrawCard { source: ActionSource::DiscardPile, color: Some(color) } => {
                Ok(Move::DrawFromDiscard { color })
            }
            Self::DrawCard { source: ActionSource::DiscardPile, color: None } => {
                Err(ActionError::MissingDiscardColor)
            }
            Self::Surrender => Ok(Move::Surrender),
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Matchmaking paired this player into a new match.
    MatchFound(MatchFoundData),

    /// Matchmaking queue status update.
    MatchmakingStatus(MatchmakingStatusData),

    /// Subscription acknowledged.
    GameSubscribed(GameSubscribedData),

    /// A match this connection subscribes to changed state.
    GameUpdated(GameUpdatedData),

    /// Pong response.
    Pong { timestamp: u64 },

    /// Request failed.
    Error(ErrorData),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// New-match notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundData {
    /// The new match.
    pub match_id: MatchId,
    /// Who the player was paired with.
    pub opponent_identity: PlayerId,
}

/// Matchmaking status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Entered the queue, waiting for an opponent.
    Searching,
    /// Entry removed at the player's request.
    Cancelled,
    /// Entry refused (banned identity).
    Rejected,
}

/// Matchmaking status payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchmakingStatusData {
    /// Queue status.
    pub status: QueueStatus,
    /// Human-readable detail.
    pub message: String,
}

/// Subscription acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSubscribedData {
    /// Match subscribed to.
    pub match_id: MatchId,
}

/// Redacted state push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdatedData {
    /// Match that changed.
    pub match_id: MatchId,
    /// The receiving viewer's redacted snapshot.
    pub game_state: GameView,
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable classification, when one applies.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

/// Error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// A legal-move rule was violated.
    RuleViolation,
    /// No such match.
    MatchNotFound,
    /// The caller is not a participant in the match.
    NotAParticipant,
    /// The message could not be parsed.
    InvalidMessage,
    /// Storage or other internal failure.
    Internal,
}

impl ErrorData {
    /// Error payload for a rule violation.
    pub fn rule_violation(violation: &RuleViolation) -> Self {
        Self {
            message: violation.to_string(),
            error_type: Some(ErrorType::RuleViolation),
        }
    }

    /// Error payload with an explicit classification.
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self { message: message.into(), error_type: Some(error_type) }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
