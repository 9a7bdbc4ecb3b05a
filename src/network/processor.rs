//! Move Processor
//!
//! The single write path for match state. Both the WebSocket channel and
//! the HTTP move endpoint funnel through `process`, which serializes all
//! mutation of one match behind a per-match lock: load, apply, persist,
//! then notify subscribers. A failed persist is surfaced to the caller
//! and nothing is broadcast.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::game::engine::{Move, RuleViolation};
use crate::game::state::{GameState, GameStatus, MatchId, PlayerId};
use crate::game::view::GameView;
use crate::network::hub::SubscriptionHub;
use crate::store::{GameRepository, StoreError};

/// Why a submitted move did not go through.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The move broke a game rule; the match is unchanged.
    #[error("illegal move: {0}")]
    Rule(#[from] RuleViolation),

    /// The caller is not one of the match's two players.
    #[error("not a participant in this match")]
    NotAParticipant,

    /// Storage failed; the match may not reflect the move.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Applies moves against stored matches.
pub struct MoveProcessor {
    store: Arc<dyn GameRepository>,
    hub: Arc<SubscriptionHub>,
    /// One lock per live match; created on first touch.
    locks: Mutex<BTreeMap<MatchId, Arc<Mutex<()>>>>,
}

impl MoveProcessor {
    /// Processor over the given store and hub.
    pub fn new(store: Arc<dyn GameRepository>, hub: Arc<SubscriptionHub>) -> Self {
        Self { store, hub, locks: Mutex::new(BTreeMap::new()) }
    }

    /// Apply one move for `player` against `match_id`.
    ///
    /// On success the updated state has been persisted and pushed to
    /// every subscriber; the returned state lets the caller build its
    /// own response view.
    pub async fn process(
        &self,
        match_id: MatchId,
        player: &PlayerId,
        mv: Move,
    ) -> Result<GameState, ProcessError> {
        let lock = self.match_lock(match_id).await;
        let guard = lock.lock().await;

        let mut game = match self.store.load(match_id) {
            Ok(game) => game,
            Err(e) => {
                drop(guard);
                self.release_if_unused(match_id, &lock).await;
                return Err(e.into());
            }
        };
        if !game.is_participant(player) {
            return Err(ProcessError::NotAParticipant);
        }

        let events = match game.apply(player, mv) {
            Ok(events) => events,
            Err(violation) => {
                debug!(match_id = %match_id, player = %player, violation = %violation,
                    "rejected move");
                return Err(violation.into());
            }
        };

        if let Err(e) = self.store.save(&game) {
            warn!(match_id = %match_id, error = %e, "failed to persist applied move");
            return Err(e.into());
        }

        for event in &events {
            debug!(match_id = %match_id, event = ?event, "game event");
        }
        if game.status == GameStatus::Finished {
            info!(match_id = %match_id, winner = ?game.winner, "match finished");
        }

        // Publish before releasing the match lock, so subscribers receive
        // updates for one match in apply order.
        self.hub.publish(&game).await;
        drop(guard);

        if game.status == GameStatus::Finished {
            self.forget_match(match_id).await;
        }
        Ok(game)
    }

    /// Load a fresh redacted snapshot for a participant, for resyncs.
    pub async fn snapshot(
        &self,
        match_id: MatchId,
        viewer: &PlayerId,
    ) -> Result<GameView, ProcessError> {
        let game = self.load_for(match_id, viewer).await?;
        Ok(GameView::for_player(&game, viewer))
    }

    /// Load a match, verifying the caller participates in it.
    pub async fn load_for(
        &self,
        match_id: MatchId,
        viewer: &PlayerId,
    ) -> Result<GameState, ProcessError> {
        let game = self.store.load(match_id)?;
        if !game.is_participant(viewer) {
            return Err(ProcessError::NotAParticipant);
        }
        Ok(game)
    }

    async fn match_lock(&self, match_id: MatchId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(match_id).or_default().clone()
    }

    /// Drop a finished match's lock entry so the table does not grow
    /// without bound.
    async fn forget_match(&self, match_id: MatchId) {
        let mut locks = self.locks.lock().await;
        locks.remove(&match_id);
    }

    /// Drop a lock entry nothing else holds. Called when a load fails,
    /// so requests against unknown match ids cannot grow the table.
    ///
    /// `strong_count == 2` means the table and `lock` hold the only
    /// references; no concurrent task can gain another while the table
    /// is locked here.
    async fn release_if_unused(&self, match_id: MatchId, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if let Some(existing) = locks.get(&match_id) {
            if Arc::ptr_eq(existing, lock) && Arc::strong_count(existing) == 2 {
                locks.remove(&match_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::GameOptions;
    use crate::network::hub::Subscriber;
    use crate::network::protocol::ServerMessage;
    use crate::network::session::next_connection_id;
    use crate::store::InMemoryGameStore;
    use tokio::sync::mpsc;

    fn fixture() -> (MoveProcessor, Arc<InMemoryGameStore>, Arc<SubscriptionHub>, GameState) {
        let store = Arc::new(InMemoryGameStore::with_entropy(9));
        let hub = Arc::new(SubscriptionHub::new());
        let game = store
            .create_match(PlayerId::from("alice"), PlayerId::from("bob"), GameOptions::default())
            .unwrap();
        let processor = MoveProcessor::new(store.clone(), hub.clone());
        (processor, store, hub, game)
    }

    /// A move the current player can always make: discard any held card.
    fn legal_discard(game: &GameState) -> (PlayerId, Move) {
        let player = game.current_player.clone();
        let card_id = game.area(&player).hand[0].id;
        (player, Move::DiscardCard { card_id })
    }

    #[tokio::test]
    async fn test_process_applies_persists_and_publishes() {
        let (processor, store, hub, game) = fixture();
        let (player, mv) = legal_discard(&game);

        // Subscribe the mover so we can observe the push.
        let (tx, mut rx) = mpsc::channel(16);
        hub.subscribe(
            &game,
            Subscriber { conn_id: next_connection_id(), identity: player.clone(), sender: tx },
        )
        .await;
        rx.recv().await.unwrap(); // ack
        rx.recv().await.unwrap(); // snapshot

        let updated = processor.process(game.id, &player, mv).await.unwrap();
        assert_eq!(updated.area(&player).hand.len(), 7);

        // Persisted.
        let stored = store.load(game.id).unwrap();
        assert_eq!(stored.move_history.len(), 1);

        // Broadcast.
        let pushed = rx.recv().await.unwrap();
        assert!(matches!(pushed, ServerMessage::GameUpdated(_)));
    }

    #[tokio::test]
    async fn test_rejected_move_changes_nothing() {
        let (processor, store, _hub, game) = fixture();
        let waiting = game.opponent_of(&game.current_player).clone();

        let err = processor
            .process(game.id, &waiting, Move::DrawFromDeck)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Rule(RuleViolation::NotYourTurn)));
        assert!(store.load(game.id).unwrap().move_history.is_empty());
    }

    #[tokio::test]
    async fn test_outsider_cannot_move_or_snapshot() {
        let (processor, _store, _hub, game) = fixture();
        let mallory = PlayerId::from("mallory");

        let err = processor
            .process(game.id, &mallory, Move::Surrender)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotAParticipant));

        let err = processor.snapshot(game.id, &mallory).await.unwrap_err();
        assert!(matches!(err, ProcessError::NotAParticipant));
    }

    #[tokio::test]
    async fn test_unknown_match() {
        let (processor, _store, _hub, _game) = fixture();
        let err = processor
            .process(MatchId::generate(), &PlayerId::from("alice"), Move::DrawFromDeck)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Store(StoreError::MatchNotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_match_does_not_grow_lock_table() {
        let (processor, _store, _hub, _game) = fixture();
        for _ in 0..100 {
            let err = processor
                .process(MatchId::generate(), &PlayerId::from("alice"), Move::DrawFromDeck)
                .await
                .unwrap_err();
            assert!(matches!(err, ProcessError::Store(StoreError::MatchNotFound(_))));
        }
        assert_eq!(processor.locks.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn test_updates_reach_subscribers_in_apply_order() {
        let (processor, _store, hub, game) = fixture();
        let first = game.current_player.clone();

        let (tx, mut rx) = mpsc::channel(16);
        hub.subscribe(
            &game,
            Subscriber { conn_id: next_connection_id(), identity: first.clone(), sender: tx },
        )
        .await;
        rx.recv().await.unwrap(); // ack
        rx.recv().await.unwrap(); // snapshot

        let card_id = game.area(&first).hand[0].id;
        processor
            .process(game.id, &first, Move::DiscardCard { card_id })
            .await
            .unwrap();
        processor.process(game.id, &first, Move::DrawFromDeck).await.unwrap();

        // Discard first (still this player's turn, draw phase), then the
        // draw that hands the turn over. The newest update arrives last.
        let ServerMessage::GameUpdated(after_discard) = rx.recv().await.unwrap() else {
            panic!("expected update");
        };
        assert_eq!(after_discard.game_state.current_player, first);

        let ServerMessage::GameUpdated(after_draw) = rx.recv().await.unwrap() else {
            panic!("expected update");
        };
        assert_eq!(after_draw.game_state.current_player, *game.opponent_of(&first));
    }

    #[tokio::test]
    async fn test_snapshot_is_redacted_for_viewer() {
        let (processor, _store, _hub, game) = fixture();
        let view = processor.snapshot(game.id, &PlayerId::from("bob")).await.unwrap();
        assert_eq!(view.you.identity, PlayerId::from("bob"));
        assert_eq!(view.opponent.hand_size, 8);
    }

    #[tokio::test]
    async fn test_failed_save_surfaces_and_skips_broadcast() {
        struct SaveFails(Arc<InMemoryGameStore>);
        impl GameRepository for SaveFails {
            fn create_match(
                &self,
                p1: PlayerId,
                p2: PlayerId,
                options: GameOptions,
            ) -> Result<GameState, StoreError> {
                self.0.create_match(p1, p2, options)
            }
            fn load(&self, id: MatchId) -> Result<GameState, StoreError> {
                self.0.load(id)
            }
            fn save(&self, _game: &GameState) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("disk on fire".into()))
            }
        }

        let inner = Arc::new(InMemoryGameStore::with_entropy(3));
        let store: Arc<dyn GameRepository> = Arc::new(SaveFails(inner.clone()));
        let hub = Arc::new(SubscriptionHub::new());
        let game = inner
            .create_match(PlayerId::from("alice"), PlayerId::from("bob"), GameOptions::default())
            .unwrap();
        let processor = MoveProcessor::new(store, hub.clone());

        let (player, mv) = legal_discard(&game);
        let (tx, mut rx) = mpsc::channel(16);
        hub.subscribe(
            &game,
            Subscriber { conn_id: next_connection_id(), identity: player.clone(), sender: tx },
        )
        .await;
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        let err = processor.process(game.id, &player, mv).await.unwrap_err();
        assert!(matches!(err, ProcessError::Store(StoreError::Unavailable(_))));

        // Nothing was pushed and the stored state is untouched.
        assert!(rx.try_recv().is_err());
        assert!(inner.load(game.id).unwrap().move_history.is_empty());
    }

    #[tokio::test]
    async fn test_full_turn_over_processor() {
        let (processor, _store, _hub, game) = fixture();
        let first = game.current_player.clone();
        let second = game.opponent_of(&first).clone();

        let card_id = game.area(&first).hand[0].id;
        processor
            .process(game.id, &first, Move::DiscardCard { card_id })
            .await
            .unwrap();
        let after_draw = processor
            .process(game.id, &first, Move::DrawFromDeck)
            .await
            .unwrap();

        assert_eq!(after_draw.current_player, second);
        assert_eq!(after_draw.area(&first).hand.len(), 8);
    }

    #[tokio::test]
    async fn test_surrender_finishes_match() {
        let (processor, store, _hub, game) = fixture();
        let quitter = game.current_player.clone();
        let opponent = game.opponent_of(&quitter).clone();

        let finished = processor
            .process(game.id, &quitter, Move::Surrender)
            .await
            .unwrap();
        assert_eq!(finished.status, GameStatus::Finished);
        assert_eq!(finished.winner, Some(opponent));
        assert_eq!(store.load(game.id).unwrap().status, GameStatus::Finished);
    }
}
