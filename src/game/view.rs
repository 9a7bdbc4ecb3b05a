//! Redacted State Views
//!
//! Per-viewer projection of the canonical state: the viewer's own hand is
//! fully visible, the opponent's hand is represented only by its size.
//! Everything else (expeditions, discard piles, scores) is public.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::game::card::{Card, Color};
use crate::game::state::{GameState, GameStatus, MatchId, PlayerId, TurnPhase};

/// The viewer's own side of the table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnSideView {
    /// Viewer identity.
    pub identity: PlayerId,
    /// Full hand, in hand order.
    pub hand: Vec<Card>,
    /// Per-color expeditions.
    pub expeditions: BTreeMap<Color, Vec<Card>>,
    /// Cumulative total over finished rounds.
    pub total_score: i32,
}

/// The opponent's side: hand redacted to a count.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentSideView {
    /// Opponent identity.
    pub identity: PlayerId,
    /// Number of cards in the opponent's hand.
    pub hand_size: usize,
    /// Per-color expeditions (public information).
    pub expeditions: BTreeMap<Color, Vec<Card>>,
    /// Cumulative total over finished rounds.
    pub total_score: i32,
}

/// A complete, redacted snapshot of one match for one viewer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    /// Match identifier.
    pub match_id: MatchId,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Whose turn it is.
    pub current_player: PlayerId,
    /// Phase within the current turn.
    pub turn_phase: TurnPhase,
    /// Current round, 1-based.
    pub current_round: u32,
    /// Rounds per game.
    pub total_rounds: u32,
    /// Whether the sixth expedition is enabled.
    pub use_purple: bool,
    /// Remaining draw pile size.
    pub deck_size: usize,
    /// The viewer's side.
    pub you: OwnSideView,
    /// The opponent's side, hand redacted.
    pub opponent: OpponentSideView,
    /// Per-color discard piles, bottom to top (public).
    pub discard_piles: BTreeMap<Color, Vec<Card>>,
    /// Per-round score ledger for finished rounds.
    pub round_scores: Vec<BTreeMap<PlayerId, i32>>,
    /// Winner once finished; None while running or on a tie.
    pub winner: Option<PlayerId>,
}

impl GameView {
    /// Build the redacted view of `state` for `viewer`.
    ///
    /// The viewer must be a participant; the hub and processor verify
    /// this before projecting.
    pub fn for_player(state: &GameState, viewer: &PlayerId) -> Self {
        let opponent = state.opponent_of(viewer).clone();
        let own_area = state.area(viewer);
        let opp_area = state.area(&opponent);

        Self {
            match_id: state.id,
            status: state.status,
            current_player: state.current_player.clone(),
            turn_phase: state.turn_phase,
            current_round: state.current_round,
            total_rounds: state.options.total_rounds,
            use_purple: state.options.use_purple,
            deck_size: state.deck_size(),
            you: OwnSideView {
                identity: viewer.clone(),
                hand: own_area.hand.clone(),
                expeditions: own_area.expeditions.clone(),
                total_score: state.scores.total(viewer),
            },
            opponent: OpponentSideView {
                identity: opponent.clone(),
                hand_size: opp_area.hand.len(),
                expeditions: opp_area.expeditions.clone(),
                total_score: state.scores.total(&opponent),
            },
            discard_piles: state.discard_piles.clone(),
            round_scores: state.scores.rounds.clone(),
            winner: state.winner.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
