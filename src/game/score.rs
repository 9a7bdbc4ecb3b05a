//! Expedition Scoring
//!
//! Pure scoring functions applied per player per color at round end.

use std::collections::BTreeMap;

use crate::game::card::{Card, CardKind, Color};
use crate::game::state::{GameState, PlayerId};

/// Fixed cost of starting an expedition.
pub const EXPEDITION_COST: i32 = 20;

/// Bonus for an expedition holding at least this many cards.
pub const BONUS_THRESHOLD: usize = 8;

/// Flat bonus awarded at the threshold.
pub const BONUS_POINTS: i32 = 20;

/// Score a single expedition sequence.
///
/// Let S = sum of expedition-card values and W = number of wager cards:
/// score = (S - 20) * (W + 1), plus a flat +20 when the expedition holds
/// 8 or more cards in total. An expedition never started scores 0; the
/// 20-point cost is only charged once any card is committed.
pub fn expedition_score(cards: &[Card]) -> i32 {
    if cards.is_empty() {
        return 0;
    }

    let sum: i32 = cards
        .iter()
        .filter(|c| c.kind == CardKind::Expedition)
        .map(|c| c.value as i32)
        .sum();
    let wagers = cards.iter().filter(|c| c.kind == CardKind::Wager).count() as i32;

    let mut score = (sum - EXPEDITION_COST) * (wagers + 1);
    if cards.len() >= BONUS_THRESHOLD {
        score += BONUS_POINTS;
    }
    score
}

/// One player's score for the current round: the sum over all active colors.
pub fn player_round_score(state: &GameState, player: &PlayerId) -> i32 {
    let area = state.area(player);
    Color::active(state.options.use_purple)
        .iter()
        .map(|&color| expedition_score(area.expedition(color)))
        .sum()
}

/// Both players' scores for the current round.
pub fn round_scores(state: &GameState) -> BTreeMap<PlayerId, i32> {
    state
        .players
        .iter()
        .map(|p| (p.clone(), player_round_score(state, p)))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
