//! Move Validation and Turn Machine
//!
//! All rule enforcement for a match: play/discard/draw operations, the
//! play→draw phase machine, round scoring and game end. Every operation is
//! a synchronous state transition returning the events it produced; rule
//! violations are ordinary `Err` values, never panics, and carry a
//! human-readable message for the client.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::card::{CardId, CardKind, Color};
use crate::game::events::{DrawSource, GameEvent};
use crate::game::score;
use crate::game::state::{GameState, GameStatus, MoveRecord, PlayerId, TurnPhase};

// =============================================================================
// MOVES
// =============================================================================

/// A player's move, exhaustively enumerated.
///
/// The wire format's free-form `action` string deserializes into this enum
/// (see `network::protocol`), so dispatch is compile-time checked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Move {
    /// Play a card from hand onto the named color's expedition.
    PlayCard {
        /// Card to play.
        card_id: CardId,
        /// Destination expedition.
        color: Color,
    },
    /// Discard a card from hand onto its color's discard pile.
    DiscardCard {
        /// Card to discard.
        card_id: CardId,
    },
    /// Draw the top card of the deck.
    DrawFromDeck,
    /// Draw the top card of one color's discard pile.
    DrawFromDiscard {
        /// Which pile.
        color: Color,
    },
    /// Concede the game.
    Surrender,
}

// =============================================================================
// RULE VIOLATIONS
// =============================================================================

/// Expected, non-fatal rule violations.
///
/// Returned to the acting player only; never broadcast, never logged
/// as errors.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleViolation {
    /// The game is not accepting moves (waiting or finished).
    #[error("game is not in progress")]
    GameNotInProgress,

    /// Acting player is not a participant in this match.
    #[error("player is not a participant in this match")]
    NotAParticipant,

    /// It is the other player's turn.
    #[error("not your turn")]
    NotYourTurn,

    /// The move does not match the current turn phase.
    #[error("wrong phase for this move")]
    WrongPhase,

    /// The named card is not in the acting player's hand.
    #[error("card is not in your hand")]
    CardNotInHand,

    /// The card's color does not match the target expedition.
    #[error("card color does not match the expedition")]
    ColorMismatch,

    /// The card's value is not strictly greater than the expedition's top.
    #[error("expedition cards must be played in ascending order")]
    OutOfOrder,

    /// A wager cannot be played once an expedition card is down.
    #[error("wager cards must be played before any expedition card")]
    WagerAfterExpedition,

    /// The named discard pile has no cards.
    #[error("discard pile is empty")]
    PileEmpty,

    /// Cannot draw back from the pile discarded to this turn.
    #[error("cannot draw from the pile you just discarded to")]
    SamePileJustDiscarded,
}

// =============================================================================
// ENGINE OPERATIONS
// =============================================================================

impl GameState {
    /// Apply a move for a player, recording it in the move history.
    ///
    /// The single entry point used by the move processor; returns the
    /// events the move produced.
    pub fn apply(&mut self, player: &PlayerId, mv: Move) -> Result<Vec<GameEvent>, RuleViolation> {
        let events = match mv {
            Move::PlayCard { card_id, color } => self.play_to_expedition(player, card_id, color)?,
            Move::DiscardCard { card_id } => self.discard_card(player, card_id)?,
            Move::DrawFromDeck => self.draw_from_deck(player)?,
            Move::DrawFromDiscard { color } => self.draw_from_discard_pile(player, color)?,
            Move::Surrender => self.surrender(player)?,
        };
        self.move_history.push(MoveRecord {
            seq: self.move_history.len() as u32 + 1,
            player: player.clone(),
            mv,
            at: chrono::Utc::now(),
        });
        Ok(events)
    }

    /// Play a card from hand onto the named color's expedition.
    ///
    /// Valid only in the play phase on the acting player's turn. The
    /// expedition must be empty, hold only wagers, or have a top
    /// expedition card of strictly lower value. On success the turn
    /// advances to the draw phase.
    pub fn play_to_expedition(
        &mut self,
        player: &PlayerId,
        card_id: CardId,
        color: Color,
    ) -> Result<Vec<GameEvent>, RuleViolation> {
        self.ensure_turn(player, TurnPhase::Play)?;

        let area = self.areas.get(player).ok_or(RuleViolation::NotAParticipant)?;
        let idx = area.hand_index(card_id).ok_or(RuleViolation::CardNotInHand)?;
        let card = area.hand[idx];

        if card.color != color {
            return Err(RuleViolation::ColorMismatch);
        }

        let pile = area.expedition(color);
        let has_expedition_card = pile.iter().any(|c| c.kind == CardKind::Expedition);
        match card.kind {
            CardKind::Wager if has_expedition_card => {
                return Err(RuleViolation::WagerAfterExpedition);
            }
            CardKind::Expedition => {
                let top = pile.iter().rev().find(|c| c.kind == CardKind::Expedition);
                if let Some(top) = top {
                    if card.value <= top.value {
                        return Err(RuleViolation::OutOfOrder);
                    }
                }
            }
            CardKind::Wager => {}
        }

        let area = self.areas.get_mut(player).ok_or(RuleViolation::NotAParticipant)?;
        let card = area.hand.remove(idx);
        area.expeditions.entry(color).or_default().push(card);
        self.turn_phase = TurnPhase::Draw;

        Ok(vec![GameEvent::CardPlayed { player: player.clone(), card, color }])
    }

    /// Discard a card from hand onto its color's discard pile.
    ///
    /// Records the pile for the same-pile redraw guard; the turn advances
    /// to the draw phase.
    pub fn discard_card(
        &mut self,
        player: &PlayerId,
        card_id: CardId,
    ) -> Result<Vec<GameEvent>, RuleViolation> {
        self.ensure_turn(player, TurnPhase::Play)?;

        let area = self.areas.get_mut(player).ok_or(RuleViolation::NotAParticipant)?;
        let idx = area.hand_index(card_id).ok_or(RuleViolation::CardNotInHand)?;
        let card = area.hand.remove(idx);

        self.discard_piles.entry(card.color).or_default().push(card);
        self.last_discard_this_turn = Some(card.color);
        self.turn_phase = TurnPhase::Draw;

        Ok(vec![GameEvent::CardDiscarded { player: player.clone(), card }])
    }

    /// Draw the top card of the deck into hand.
    ///
    /// If this draw empties the deck the round ends immediately instead of
    /// a normal turn switch.
    pub fn draw_from_deck(&mut self, player: &PlayerId) -> Result<Vec<GameEvent>, RuleViolation> {
        self.ensure_turn(player, TurnPhase::Draw)?;

        let mut events = Vec::new();
        if let Some(card) = self.deck.pop() {
            let area = self.areas.get_mut(player).ok_or(RuleViolation::NotAParticipant)?;
            area.hand.push(card);
            events.push(GameEvent::CardDrawn {
                player: player.clone(),
                source: DrawSource::Deck,
                card,
            });
        }

        if self.deck.is_empty() {
            events.extend(self.finish_round());
        } else {
            events.push(self.end_turn());
        }
        Ok(events)
    }

    /// Draw the top card of one color's discard pile into hand.
    ///
    /// A player may never draw back from the pile they discarded to during
    /// the current turn; the guard resets on every turn switch.
    pub fn draw_from_discard_pile(
        &mut self,
        player: &PlayerId,
        color: Color,
    ) -> Result<Vec<GameEvent>, RuleViolation> {
        self.ensure_turn(player, TurnPhase::Draw)?;

        let has_cards = self.discard_piles.get(&color).is_some_and(|p| !p.is_empty());
        if !has_cards {
            return Err(RuleViolation::PileEmpty);
        }
        if self.last_discard_this_turn == Some(color) {
            return Err(RuleViolation::SamePileJustDiscarded);
        }

        let mut events = Vec::new();
        if let Some(card) = self.discard_piles.get_mut(&color).and_then(Vec::pop) {
            let area = self.areas.get_mut(player).ok_or(RuleViolation::NotAParticipant)?;
            area.hand.push(card);
            events.push(GameEvent::CardDrawn {
                player: player.clone(),
                source: DrawSource::DiscardPile { color },
                card,
            });
        }

        events.push(self.end_turn());
        Ok(events)
    }

    /// Concede the game; the opponent wins immediately, regardless of
    /// whose turn or which phase it is.
    pub fn surrender(&mut self, player: &PlayerId) -> Result<Vec<GameEvent>, RuleViolation> {
        self.ensure_active(player)?;

        let winner = self.opponent_of(player).clone();
        self.status = GameStatus::Finished;
        self.winner = Some(winner.clone());

        Ok(vec![
            GameEvent::Surrendered { player: player.clone() },
            GameEvent::GameEnded { winner: Some(winner) },
        ])
    }

    // =========================================================================
    // INTERNAL TRANSITIONS
    // =========================================================================

    /// Reject moves from non-participants or on games not in progress.
    fn ensure_active(&self, player: &PlayerId) -> Result<(), RuleViolation> {
        if self.status != GameStatus::InProgress {
            return Err(RuleViolation::GameNotInProgress);
        }
        if !self.is_participant(player) {
            return Err(RuleViolation::NotAParticipant);
        }
        Ok(())
    }

    /// Turn and phase gate shared by all four move operations.
    fn ensure_turn(&self, player: &PlayerId, phase: TurnPhase) -> Result<(), RuleViolation> {
        self.ensure_active(player)?;
        if &self.current_player != player {
            return Err(RuleViolation::NotYourTurn);
        }
        if self.turn_phase != phase {
            return Err(RuleViolation::WrongPhase);
        }
        Ok(())
    }

    /// Pass the turn to the other player and reset per-turn state.
    fn end_turn(&mut self) -> GameEvent {
        self.current_player = self.opponent_of(&self.current_player).clone();
        self.turn_phase = TurnPhase::Play;
        self.last_discard_this_turn = None;
        GameEvent::TurnEnded { next_player: self.current_player.clone() }
    }

    /// Score the current round and either advance to the next round or
    /// finish the game.
    fn finish_round(&mut self) -> Vec<GameEvent> {
        let scores = score::round_scores(self);
        self.scores.rounds.push(scores.clone());

        let mut events = vec![GameEvent::RoundEnded { round: self.current_round, scores }];

        if self.current_round >= self.options.total_rounds {
            self.status = GameStatus::Finished;
            let total1 = self.scores.total(&self.players[0]);
            let total2 = self.scores.total(&self.players[1]);
            self.winner = if total1 > total2 {
                Some(self.players[0].clone())
            } else if total2 > total1 {
                Some(self.players[1].clone())
            } else {
                None
            };
            events.push(GameEvent::GameEnded { winner: self.winner.clone() });
        } else {
            self.current_round += 1;
            // The round starter does not rotate between rounds.
            self.current_player = self.round_starter.clone();
            self.deal_round();
        }
        events
    }
}

// =============================================================================
// TESTS
// =============================================================================
