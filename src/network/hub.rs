//! Match Subscription Hub
//!
//! Tracks which connections observe which matches and pushes a freshly
//! redacted view to every subscriber whenever a match changes. The
//! relation is not ownership; connections come and go independently and
//! the hub drops entries whose channel has closed.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::game::state::{GameState, MatchId, PlayerId};
use crate::game::view::GameView;
use crate::network::protocol::{GameSubscribedData, GameUpdatedData, ServerMessage};
use crate::network::session::ConnectionId;

/// One connection observing one match.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Which connection.
    pub conn_id: ConnectionId,
    /// Which identity the view is redacted for.
    pub identity: PlayerId,
    /// Outbound channel to the connection.
    pub sender: mpsc::Sender<ServerMessage>,
}

/// matchId -> subscribers relation.
pub struct SubscriptionHub {
    subscriptions: RwLock<BTreeMap<MatchId, Vec<Subscriber>>>,
}

impl SubscriptionHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self { subscriptions: RwLock::new(BTreeMap::new()) }
    }

    /// Subscribe a connection to a match and send the acknowledgement
    /// plus an immediate snapshot.
    ///
    /// Re-subscribing from the same connection replaces the old entry,
    /// so a resync after reconnect never double-registers.
    pub async fn subscribe(&self, state: &GameState, subscriber: Subscriber) {
        let ack = ServerMessage::GameSubscribed(GameSubscribedData { match_id: state.id });
        let snapshot = ServerMessage::GameUpdated(GameUpdatedData {
            match_id: state.id,
            game_state: GameView::for_player(state, &subscriber.identity),
        });
        let sender = subscriber.sender.clone();

        {
            let mut subs = self.subscriptions.write().await;
            let entry = subs.entry(state.id).or_default();
            entry.retain(|s| s.conn_id != subscriber.conn_id);
            entry.push(subscriber);
        }

        let _ = sender.send(ack).await;
        let _ = sender.send(snapshot).await;
    }

    /// Push the new state of a match to all of its subscribers, each one
    /// receiving a view redacted for its own identity. Subscribers whose
    /// channel has closed are dropped from the relation.
    pub async fn publish(&self, state: &GameState) {
        let subscribers: Vec<Subscriber> = {
            let subs = self.subscriptions.read().await;
            match subs.get(&state.id) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        let mut dead: Vec<ConnectionId> = Vec::new();
        for sub in &subscribers {
            let update = ServerMessage::GameUpdated(GameUpdatedData {
                match_id: state.id,
                game_state: GameView::for_player(state, &sub.identity),
            });
            if sub.sender.send(update).await.is_err() {
                dead.push(sub.conn_id);
            }
        }

        if !dead.is_empty() {
            debug!(match_id = %state.id, dropped = dead.len(), "pruning closed subscribers");
            let mut subs = self.subscriptions.write().await;
            if let Some(list) = subs.get_mut(&state.id) {
                list.retain(|s| !dead.contains(&s.conn_id));
                if list.is_empty() {
                    subs.remove(&state.id);
                }
            }
        }
    }

    /// Remove a connection from every match it observes. Called on
    /// disconnect.
    pub async fn unsubscribe_connection(&self, conn_id: ConnectionId) {
        let mut subs = self.subscriptions.write().await;
        subs.retain(|_, list| {
            list.retain(|s| s.conn_id != conn_id);
            !list.is_empty()
        });
    }

    /// Number of subscribers for one match.
    pub async fn subscriber_count(&self, match_id: MatchId) -> usize {
        let subs = self.subscriptions.read().await;
        subs.get(&match_id).map(Vec::len).unwrap_or(0)
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::GameOptions;
    use crate::network::session::next_connection_id;

    fn new_game() -> GameState {
        GameState::new(
            MatchId::generate(),
            PlayerId::from("alice"),
            PlayerId::from("bob"),
            GameOptions::default(),
            7,
        )
    }

    fn subscriber(identity: &str) -> (Subscriber, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let sub = Subscriber {
            conn_id: next_connection_id(),
            identity: PlayerId::from(identity),
            sender: tx,
        };
        (sub, rx)
    }

    #[tokio::test]
    async fn test_subscribe_acks_and_snapshots() {
        let hub = SubscriptionHub::new();
        let game = new_game();
        let (sub, mut rx) = subscriber("alice");

        hub.subscribe(&game, sub).await;
        assert_eq!(hub.subscriber_count(game.id).await, 1);

        let ack = rx.recv().await.unwrap();
        assert!(matches!(ack, ServerMessage::GameSubscribed(ref d) if d.match_id == game.id));

        let snapshot = rx.recv().await.unwrap();
        let ServerMessage::GameUpdated(data) = snapshot else {
            panic!("expected snapshot");
        };
        assert_eq!(data.game_state.you.identity, PlayerId::from("alice"));
    }

    #[tokio::test]
    async fn test_publish_redacts_per_viewer() {
        let hub = SubscriptionHub::new();
        let game = new_game();
        let (alice_sub, mut alice_rx) = subscriber("alice");
        let (bob_sub, mut bob_rx) = subscriber("bob");

        hub.subscribe(&game, alice_sub).await;
        hub.subscribe(&game, bob_sub).await;
        // Drain ack + snapshot.
        for rx in [&mut alice_rx, &mut bob_rx] {
            rx.recv().await.unwrap();
            rx.recv().await.unwrap();
        }

        hub.publish(&game).await;

        let ServerMessage::GameUpdated(alice_update) = alice_rx.recv().await.unwrap() else {
            panic!("expected update");
        };
        let ServerMessage::GameUpdated(bob_update) = bob_rx.recv().await.unwrap() else {
            panic!("expected update");
        };
        assert_eq!(alice_update.game_state.you.identity, PlayerId::from("alice"));
        assert_eq!(bob_update.game_state.you.identity, PlayerId::from("bob"));
        assert_ne!(alice_update.game_state.you.hand, bob_update.game_state.you.hand);
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_pruned() {
        let hub = SubscriptionHub::new();
        let game = new_game();
        let (alice_sub, alice_rx) = subscriber("alice");
        let (bob_sub, mut _bob_rx) = subscriber("bob");

        hub.subscribe(&game, alice_sub).await;
        hub.subscribe(&game, bob_sub).await;
        drop(alice_rx);

        hub.publish(&game).await;
        assert_eq!(hub.subscriber_count(game.id).await, 1);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_entry() {
        let hub = SubscriptionHub::new();
        let game = new_game();
        let (mut sub, _rx1) = subscriber("alice");
        let conn_id = sub.conn_id;
        hub.subscribe(&game, sub.clone()).await;

        let (tx, _rx2) = mpsc::channel(16);
        sub.sender = tx;
        sub.conn_id = conn_id;
        hub.subscribe(&game, sub).await;

        assert_eq!(hub.subscriber_count(game.id).await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_connection_clears_all_matches() {
        let hub = SubscriptionHub::new();
        let game1 = new_game();
        let game2 = new_game();
        let (tx, _rx) = mpsc::channel(16);
        let conn_id = next_connection_id();

        for game in [&game1, &game2] {
            hub.subscribe(
                game,
                Subscriber {
                    conn_id,
                    identity: PlayerId::from("alice"),
                    sender: tx.clone(),
                },
            )
            .await;
        }

        hub.unsubscribe_connection(conn_id).await;
        assert_eq!(hub.subscriber_count(game1.id).await, 0);
        assert_eq!(hub.subscriber_count(game2.id).await, 0);
    }
}
