//! Game State Definitions
//!
//! The authoritative aggregate for one match. Uses BTreeMap for
//! deterministic iteration order; all mutation goes through the engine
//! operations in `engine.rs`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::rng::DeterministicRng;
use crate::game::card::{build_deck, Card, CardId, Color};
use crate::game::engine::Move;

/// Cards dealt to each player at the start of every round.
pub const HAND_SIZE: usize = 8;

/// Default number of rounds per game.
pub const DEFAULT_TOTAL_ROUNDS: u32 = 3;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque player identity, as resolved by the external auth collaborator.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Create from any string-like identity.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Unique match identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub Uuid);

impl MatchId {
    /// Generate a fresh random match id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Raw bytes, used for seed derivation.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// STATUS / PHASE
// =============================================================================

/// Lifecycle status of a game.
///
/// Matches are created fully dealt, so they start in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Both players seated, moves accepted.
    InProgress,
    /// Game over; no further moves accepted.
    Finished,
}

/// Phase within one player's turn: play-or-discard, then draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Must play a card to an expedition or discard one.
    Play,
    /// Must draw from the deck or a discard pile.
    Draw,
}

/// Per-match options fixed at creation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GameOptions {
    /// Enable the sixth (purple) expedition.
    pub use_purple: bool,
    /// Rounds per game.
    pub total_rounds: u32,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self { use_purple: false, total_rounds: DEFAULT_TOTAL_ROUNDS }
    }
}

// =============================================================================
// PER-PLAYER AREA
// =============================================================================

/// One player's hand and expeditions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlayerArea {
    /// Cards currently held.
    pub hand: Vec<Card>,
    /// Per-color expedition sequences, in play order.
    pub expeditions: BTreeMap<Color, Vec<Card>>,
}

impl PlayerArea {
    /// Find the position of a card in hand.
    pub fn hand_index(&self, card_id: CardId) -> Option<usize> {
        self.hand.iter().position(|c| c.id == card_id)
    }

    /// The expedition sequence for a color (empty slice if never started).
    pub fn expedition(&self, color: Color) -> &[Card] {
        self.expeditions.get(&color).map(Vec::as_slice).unwrap_or(&[])
    }
}

// =============================================================================
// MOVE HISTORY / SCORE LEDGER
// =============================================================================

/// One applied move, for history and audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Sequence number within the match, starting at 1.
    pub seq: u32,
    /// Acting player.
    pub player: PlayerId,
    /// The move that was applied.
    pub mv: Move,
    /// Server time when the move was accepted.
    pub at: DateTime<Utc>,
}

/// Per-round scores for both players, appended as each round ends.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScoreSheet {
    /// One entry per completed round.
    pub rounds: Vec<BTreeMap<PlayerId, i32>>,
}

impl ScoreSheet {
    /// Cumulative total for a player.
    pub fn total(&self, player: &PlayerId) -> i32 {
        self.rounds.iter().filter_map(|r| r.get(player)).sum()
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Full authoritative state of one match.
///
/// Owned exclusively by whichever operation holds the per-match lock;
/// the engine mutates it synchronously with no I/O.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameState {
    /// Match identifier.
    pub id: MatchId,
    /// The two participants, in seating order.
    pub players: [PlayerId; 2],
    /// Lifecycle status.
    pub status: GameStatus,
    /// Whose turn it is.
    pub current_player: PlayerId,
    /// Player who opened the current round (not rotated between rounds).
    pub round_starter: PlayerId,
    /// Phase within the current turn.
    pub turn_phase: TurnPhase,
    /// Current round, 1-based.
    pub current_round: u32,
    /// Match options.
    pub options: GameOptions,
    /// Draw pile; cards are drawn from the end.
    pub deck: Vec<Card>,
    /// Per-player hands and expeditions.
    pub areas: BTreeMap<PlayerId, PlayerArea>,
    /// Per-color discard stacks (top of pile is the last element).
    pub discard_piles: BTreeMap<Color, Vec<Card>>,
    /// Color discarded to during the current turn, if any.
    /// Guards the same-pile redraw; cleared on every turn switch.
    pub last_discard_this_turn: Option<Color>,
    /// Every applied move, in order.
    pub move_history: Vec<MoveRecord>,
    /// Score ledger, one entry per finished round.
    pub scores: ScoreSheet,
    /// Winner once finished; None while running or on a drawn game.
    pub winner: Option<PlayerId>,
    /// Deck RNG; seeded at creation, advanced once per round deal.
    pub rng: DeterministicRng,
}

impl GameState {
    /// Create a new match between two players and deal the first round.
    ///
    /// The seed fully determines every deal of the match; production code
    /// derives it via [`crate::core::rng::derive_match_seed`].
    pub fn new(
        id: MatchId,
        player1: PlayerId,
        player2: PlayerId,
        options: GameOptions,
        seed: u64,
    ) -> Self {
        let mut areas = BTreeMap::new();
        areas.insert(player1.clone(), PlayerArea::default());
        areas.insert(player2.clone(), PlayerArea::default());

        let mut state = Self {
            id,
            players: [player1.clone(), player2],
            status: GameStatus::InProgress,
            current_player: player1.clone(),
            round_starter: player1,
            turn_phase: TurnPhase::Play,
            current_round: 1,
            options,
            deck: Vec::new(),
            areas,
            discard_piles: BTreeMap::new(),
            last_discard_this_turn: None,
            move_history: Vec::new(),
            scores: ScoreSheet::default(),
            winner: None,
            rng: DeterministicRng::new(seed),
        };
        state.deal_round();
        state
    }

    /// Build, shuffle, and deal a fresh round.
    ///
    /// Clears expeditions, discard piles, and the per-turn discard marker;
    /// both hands are replaced with HAND_SIZE fresh cards.
    pub(crate) fn deal_round(&mut self) {
        let mut deck = build_deck(self.options.use_purple);
        self.rng.shuffle(&mut deck);

        for area in self.areas.values_mut() {
            area.hand.clear();
            area.expeditions.clear();
        }
        self.discard_piles.clear();
        self.last_discard_this_turn = None;

        // Deal in seating order so a pinned seed replays identically.
        for player in self.players.clone() {
            let hand: Vec<Card> = deck.split_off(deck.len() - HAND_SIZE);
            if let Some(area) = self.areas.get_mut(&player) {
                area.hand = hand;
            }
        }
        self.deck = deck;
        self.turn_phase = TurnPhase::Play;
    }

    /// Is this identity one of the two participants?
    pub fn is_participant(&self, player: &PlayerId) -> bool {
        self.players.iter().any(|p| p == player)
    }

    /// The other participant.
    pub fn opponent_of(&self, player: &PlayerId) -> &PlayerId {
        if &self.players[0] == player {
            &self.players[1]
        } else {
            &self.players[0]
        }
    }

    /// This player's area.
    ///
    /// # Panics
    ///
    /// Panics if `player` is not a participant; callers gate on
    /// [`GameState::is_participant`] first.
    pub fn area(&self, player: &PlayerId) -> &PlayerArea {
        &self.areas[player]
    }

    /// Remaining draw pile size.
    pub fn deck_size(&self) -> usize {
        self.deck.len()
    }

    /// Every card id currently tracked by the match, sorted.
    ///
    /// Union of deck, both hands, all expeditions, and all discard piles;
    /// conservation tests compare this against the constructed deck.
    pub fn all_card_ids(&self) -> Vec<CardId> {
        let mut ids: Vec<CardId> = self.deck.iter().map(|c| c.id).collect();
        for area in self.areas.values() {
            ids.extend(area.hand.iter().map(|c| c.id));
            for pile in area.expeditions.values() {
                ids.extend(pile.iter().map(|c| c.id));
            }
        }
        for pile in self.discard_piles.values() {
            ids.extend(pile.iter().map(|c| c.id));
        }
        ids.sort_unstable();
        ids
    }
}

// =============================================================================
// TESTS
// =============================================================================
