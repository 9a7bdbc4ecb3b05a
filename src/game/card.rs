//! Card and Deck Definitions
//!
//! Immutable card value types and deterministic deck construction.
//! Card ids are derived from (color, kind, ordinal) so the same deck
//! composition always yields the same ids.

use serde::{Serialize, Deserialize};

/// Lowest expedition card value.
pub const MIN_EXPEDITION_VALUE: u8 = 2;
/// Highest expedition card value.
pub const MAX_EXPEDITION_VALUE: u8 = 10;
/// Wager cards carry no point value of their own.
pub const WAGER_VALUE: u8 = 0;
/// Wager cards per color.
pub const WAGERS_PER_COLOR: u8 = 3;
/// Total cards per color (wagers + one of each expedition value).
pub const CARDS_PER_COLOR: u8 =
    WAGERS_PER_COLOR + (MAX_EXPEDITION_VALUE - MIN_EXPEDITION_VALUE + 1);

// =============================================================================
// COLOR
// =============================================================================

/// Expedition color.
///
/// `Purple` is the optional sixth expedition, enabled per match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Color {
    /// Red expedition.
    Red = 0,
    /// Green expedition.
    Green = 1,
    /// White expedition.
    White = 2,
    /// Blue expedition.
    Blue = 3,
    /// Yellow expedition.
    Yellow = 4,
    /// Optional sixth expedition.
    Purple = 5,
}

/// The five base colors, in id order.
pub const BASE_COLORS: [Color; 5] =
    [Color::Red, Color::Green, Color::White, Color::Blue, Color::Yellow];

impl Color {
    /// Colors active for a match, depending on whether the sixth is enabled.
    pub fn active(use_purple: bool) -> &'static [Color] {
        if use_purple {
            const ALL: [Color; 6] = [
                Color::Red,
                Color::Green,
                Color::White,
                Color::Blue,
                Color::Yellow,
                Color::Purple,
            ];
            &ALL
        } else {
            &BASE_COLORS
        }
    }

    /// Get color from index (0-5).
    pub fn from_index(index: u8) -> Option<Color> {
        match index {
            0 => Some(Color::Red),
            1 => Some(Color::Green),
            2 => Some(Color::White),
            3 => Some(Color::Blue),
            4 => Some(Color::Yellow),
            5 => Some(Color::Purple),
            _ => None,
        }
    }
}

// =============================================================================
// CARD
// =============================================================================

/// Card kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    /// Numbered expedition card (values 2-10).
    Expedition,
    /// Wager card, multiplies its expedition's score.
    Wager,
}

/// Compact card identifier, unique within one deck.
pub type CardId = u16;

/// A single immutable card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Deterministic id derived from color + kind + ordinal.
    pub id: CardId,
    /// Expedition color.
    pub color: Color,
    /// Expedition or wager.
    pub kind: CardKind,
    /// Point value (2-10 for expedition cards, 0 for wagers).
    pub value: u8,
}

impl Card {
    /// Construct the card at `ordinal` within its color.
    ///
    /// Ordinals 0..WAGERS_PER_COLOR are wagers; the rest are expedition
    /// cards in ascending value order.
    fn from_ordinal(color: Color, ordinal: u8) -> Self {
        debug_assert!(ordinal < CARDS_PER_COLOR);
        let id = (color as u16) * CARDS_PER_COLOR as u16 + ordinal as u16;
        if ordinal < WAGERS_PER_COLOR {
            Card { id, color, kind: CardKind::Wager, value: WAGER_VALUE }
        } else {
            let value = MIN_EXPEDITION_VALUE + (ordinal - WAGERS_PER_COLOR);
            Card { id, color, kind: CardKind::Expedition, value }
        }
    }

    /// Is this a wager card?
    #[inline]
    pub fn is_wager(&self) -> bool {
        self.kind == CardKind::Wager
    }
}

/// Build the full, unshuffled deck for the given color set.
///
/// Per active color: 3 wager cards plus one expedition card of each value
/// 2 through 10.
pub fn build_deck(use_purple: bool) -> Vec<Card> {
    let colors = Color::active(use_purple);
    let mut deck = Vec::with_capacity(colors.len() * CARDS_PER_COLOR as usize);
    for &color in colors {
        for ordinal in 0..CARDS_PER_COLOR {
            deck.push(Card::from_ordinal(color, ordinal));
        }
    }
    deck
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_deck_sizes() {
        assert_eq!(build_deck(false).len(), 60);
        assert_eq!(build_deck(true).len(), 72);
    }

    #[test]
    fn test_deck_ids_unique() {
        let deck = build_deck(true);
        let ids: BTreeSet<CardId> = deck.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), deck.len());
    }

    #[test]
    fn test_deck_ids_deterministic() {
        let a = build_deck(false);
        let b = build_deck(false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_per_color_composition() {
        let deck = build_deck(false);
        for &color in BASE_COLORS.iter() {
            let wagers = deck.iter().filter(|c| c.color == color && c.is_wager()).count();
            assert_eq!(wagers, WAGERS_PER_COLOR as usize);

            let mut values: Vec<u8> = deck
                .iter()
                .filter(|c| c.color == color && c.kind == CardKind::Expedition)
                .map(|c| c.value)
                .collect();
            values.sort_unstable();
            assert_eq!(values, (MIN_EXPEDITION_VALUE..=MAX_EXPEDITION_VALUE).collect::<Vec<u8>>());
        }
    }

    #[test]
    fn test_purple_only_when_enabled() {
        assert!(!build_deck(false).iter().any(|c| c.color == Color::Purple));
        assert!(build_deck(true).iter().any(|c| c.color == Color::Purple));
    }

    #[test]
    fn test_color_from_index() {
        for i in 0..6 {
            let color = Color::from_index(i).unwrap();
            assert_eq!(color as u8, i);
        }
        assert!(Color::from_index(6).is_none());
    }

    #[test]
    fn test_card_serde_roundtrip() {
        let deck = build_deck(true);
        let json = serde_json::to_string(&deck[0]).unwrap();
        let back: Card = serde_json::from_str(&json).unwrap();
        assert_eq!(back, deck[0]);
        assert!(json.contains("red"));
        assert!(json.contains("wager"));
    }
}
