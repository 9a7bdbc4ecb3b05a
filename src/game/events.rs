//! Game Events
//!
//! Events emitted by applied moves, for logging, history consumers,
//! and round/game-end reporting.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::game::card::{Card, Color};
use crate::game::state::PlayerId;

/// Where a drawn card came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DrawSource {
    /// Top of the draw pile.
    Deck,
    /// Top of one color's discard pile.
    DiscardPile {
        /// Which pile.
        color: Color,
    },
}

/// One event produced by a successfully applied move.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEvent {
    /// A card was played onto an expedition.
    CardPlayed {
        /// Acting player.
        player: PlayerId,
        /// The played card.
        card: Card,
        /// Destination expedition.
        color: Color,
    },

    /// A card was discarded.
    CardDiscarded {
        /// Acting player.
        player: PlayerId,
        /// The discarded card.
        card: Card,
    },

    /// A card was drawn into hand.
    CardDrawn {
        /// Acting player.
        player: PlayerId,
        /// Deck or a discard pile.
        source: DrawSource,
        /// The drawn card. Only ever shown to the drawing player.
        card: Card,
    },

    /// The turn passed to the other player.
    TurnEnded {
        /// Player whose turn begins.
        next_player: PlayerId,
    },

    /// A round finished and was scored.
    RoundEnded {
        /// The round that just ended, 1-based.
        round: u32,
        /// Both players' scores for that round.
        scores: BTreeMap<PlayerId, i32>,
    },

    /// A player conceded.
    Surrendered {
        /// The conceding player.
        player: PlayerId,
    },

    /// The game is over.
    GameEnded {
        /// Winner, or None on an exact tie.
        winner: Option<PlayerId>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = GameEvent::TurnEnded { next_player: PlayerId::from("bob") };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("turn_ended"));
        assert!(json.contains("bob"));
    }

    #[test]
    fn test_draw_source_tags() {
        let deck = serde_json::to_string(&DrawSource::Deck).unwrap();
        assert!(deck.contains("deck"));

        let pile = serde_json::to_string(&DrawSource::DiscardPile {
            color: crate::game::card::Color::Red,
        })
        .unwrap();
        assert!(pile.contains("discard_pile"));
        assert!(pile.contains("red"));
    }
}
