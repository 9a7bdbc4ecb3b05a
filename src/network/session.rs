//! Session Registry
//!
//! Maps each identity to its single active connection. Authenticating as
//! an identity that already has a live connection force-closes the prior
//! one before the new one is accepted, so ghost sessions cannot pile up.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

use crate::game::state::PlayerId;
use crate::network::protocol::ServerMessage;

/// Unique per-connection identifier, monotonic across the process.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh connection id.
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// The registry's view of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Which connection this is.
    pub conn_id: ConnectionId,
    /// Outbound message channel to the connection's writer task.
    pub sender: mpsc::Sender<ServerMessage>,
    /// Close signal; the connection task exits when it fires.
    pub close_tx: mpsc::Sender<String>,
}

impl ConnectionHandle {
    /// Build a handle plus the close receiver its connection task selects on.
    pub fn new(
        conn_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> (Self, mpsc::Receiver<String>) {
        let (close_tx, close_rx) = mpsc::channel(1);
        (Self { conn_id, sender, close_tx }, close_rx)
    }
}

/// Identity -> active connection map.
pub struct SessionRegistry {
    connections: RwLock<BTreeMap<PlayerId, ConnectionHandle>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { connections: RwLock::new(BTreeMap::new()) }
    }

    /// Register `identity` as owned by `handle`.
    ///
    /// Any previously registered connection for the same identity is told
    /// to close and its handle returned, already displaced from the map.
    pub async fn register(
        &self,
        identity: PlayerId,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let mut connections = self.connections.write().await;
        let displaced = connections.insert(identity, handle);
        if let Some(ref prev) = displaced {
            // Capacity-1 channel; a second signal to the same dying
            // connection is redundant, so try_send is enough.
            let _ = prev
                .close_tx
                .try_send("superseded by a new connection".to_string());
        }
        displaced
    }

    /// Remove `identity`'s entry, but only if it still belongs to `conn_id`.
    ///
    /// A force-closed connection unregisters late, after its replacement
    /// registered; the guard keeps it from tearing down the new session.
    pub async fn unregister(&self, identity: &PlayerId, conn_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(identity) {
            Some(handle) if handle.conn_id == conn_id => {
                connections.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Look up the outbound channel for an identity.
    pub async fn resolve(&self, identity: &PlayerId) -> Option<mpsc::Sender<ServerMessage>> {
        let connections = self.connections.read().await;
        connections.get(identity).map(|h| h.sender.clone())
    }

    /// Is this identity currently connected?
    pub async fn is_connected(&self, identity: &PlayerId) -> bool {
        let connections = self.connections.read().await;
        connections.contains_key(identity)
    }

    /// Number of live registered connections.
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
