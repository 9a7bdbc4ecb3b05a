//! Matchmaking Queue
//!
//! A FIFO queue of identities waiting for an opponent. The moment two
//! entries are present the two oldest are paired: a match is created and
//! persisted, both players are notified, and both connections are
//! subscribed to the new match.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use crate::game::state::{GameOptions, PlayerId};
use crate::network::hub::{SubscriptionHub, Subscriber};
use crate::network::protocol::{
    ErrorData, ErrorType, MatchFoundData, MatchmakingStatusData, QueueStatus, ServerMessage,
};
use crate::network::session::ConnectionId;
use crate::store::{BanList, GameRepository};

/// One waiting player.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Connection that asked to queue.
    pub conn_id: ConnectionId,
    /// Queued identity.
    pub identity: PlayerId,
    /// When the entry joined, for FIFO ordering and diagnostics.
    pub joined_at: DateTime<Utc>,
    /// Outbound channel to the connection.
    pub sender: mpsc::Sender<ServerMessage>,
}

/// FIFO matchmaking queue.
///
/// All queue access happens under one lock; pairing runs under the same
/// lock as the insert that triggered it, so two concurrent `find_match`
/// calls cannot both pair with the same waiting player.
pub struct MatchmakingQueue {
    queue: Mutex<VecDeque<QueueEntry>>,
    store: Arc<dyn GameRepository>,
    bans: Arc<dyn BanList>,
    hub: Arc<SubscriptionHub>,
    options: GameOptions,
}

impl MatchmakingQueue {
    /// Queue backed by the given store, ban list, and hub.
    pub fn new(
        store: Arc<dyn GameRepository>,
        bans: Arc<dyn BanList>,
        hub: Arc<SubscriptionHub>,
        options: GameOptions,
    ) -> Self {
        Self { queue: Mutex::new(VecDeque::new()), store, bans, hub, options }
    }

    /// Add a player to the queue, pairing immediately if an opponent is
    /// already waiting. A re-search replaces any earlier entry for the
    /// same identity, so a fresh connection supersedes a stale one.
    /// Status and match notifications go straight to the involved
    /// connections.
    pub async fn enqueue(&self, entry: QueueEntry) {
        if self.bans.is_banned(&entry.identity) {
            let _ = entry
                .sender
                .send(ServerMessage::MatchmakingStatus(MatchmakingStatusData {
                    status: QueueStatus::Rejected,
                    message: "identity is not allowed to queue".into(),
                }))
                .await;
            return;
        }

        let mut queue = self.queue.lock().await;
        queue.retain(|e| e.identity != entry.identity);

        let _ = entry
            .sender
            .send(ServerMessage::MatchmakingStatus(MatchmakingStatusData {
                status: QueueStatus::Searching,
                message: "waiting for an opponent".into(),
            }))
            .await;
        queue.push_back(entry);

        self.try_pair(&mut queue).await;
    }

    /// Remove a connection's entry at the player's request.
    pub async fn cancel(&self, conn_id: ConnectionId) -> bool {
        let removed = self.remove_connection(conn_id).await;
        if let Some(ref entry) = removed {
            let _ = entry
                .sender
                .send(ServerMessage::MatchmakingStatus(MatchmakingStatusData {
                    status: QueueStatus::Cancelled,
                    message: "left the queue".into(),
                }))
                .await;
        }
        removed.is_some()
    }

    /// Silently purge a connection's entry. Called on disconnect.
    pub async fn remove_connection(&self, conn_id: ConnectionId) -> Option<QueueEntry> {
        let mut queue = self.queue.lock().await;
        let pos = queue.iter().position(|e| e.conn_id == conn_id)?;
        queue.remove(pos)
    }

    /// Number of waiting players.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Is the queue empty?
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Pop and pair the two oldest live entries, repeating while the
    /// queue still holds two. Entries whose connection already went away
    /// are discarded instead of paired.
    async fn try_pair(&self, queue: &mut VecDeque<QueueEntry>) {
        loop {
            queue.retain(|e| !e.sender.is_closed());
            if queue.len() < 2 {
                return;
            }

            // Oldest two; push_back + pop_front keeps FIFO fairness.
            let first = match queue.pop_front() {
                Some(e) => e,
                None => return,
            };
            let second = match queue.pop_front() {
                Some(e) => e,
                None => {
                    queue.push_front(first);
                    return;
                }
            };

            self.start_match(first, second).await;
        }
    }

    async fn start_match(&self, first: QueueEntry, second: QueueEntry) {
        let game = match self.store.create_match(
            first.identity.clone(),
            second.identity.clone(),
            self.options.clone(),
        ) {
            Ok(game) => game,
            Err(e) => {
                error!(error = %e, "failed to create match for paired players");
                for entry in [&first, &second] {
                    let _ = entry
                        .sender
                        .send(ServerMessage::Error(ErrorData::new(
                            ErrorType::Internal,
                            "could not create match",
                        )))
                        .await;
                }
                return;
            }
        };

        info!(
            match_id = %game.id,
            player1 = %first.identity,
            player2 = %second.identity,
            "matchmaking paired players"
        );

        for (entry, opponent) in [(&first, &second.identity), (&second, &first.identity)] {
            let _ = entry
                .sender
                .send(ServerMessage::MatchFound(MatchFoundData {
                    match_id: game.id,
                    opponent_identity: opponent.clone(),
                }))
                .await;
            self.hub
                .subscribe(
                    &game,
                    Subscriber {
                        conn_id: entry.conn_id,
                        identity: entry.identity.clone(),
                        sender: entry.sender.clone(),
                    },
                )
                .await;
        }
    }
}
