//! WebSocket Game Server
//!
//! Accepts WebSocket connections and routes the realtime protocol:
//! matchmaking, subscriptions, and moves. Each connection gets a reader
//! task and a writer task; all shared structures are injected at
//! construction so the same wiring serves tests and the binary.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::game::state::{GameOptions, PlayerId};
use crate::network::hub::{SubscriptionHub, Subscriber};
use crate::network::matchmaking::{MatchmakingQueue, QueueEntry};
use crate::network::processor::{MoveProcessor, ProcessError};
use crate::network::protocol::{
    ClientMessage, ErrorData, ErrorType, GameUpdatedData, ServerMessage,
};
use crate::network::session::{
    next_connection_id, ConnectionHandle, ConnectionId, SessionRegistry,
};
use crate::store::{BanList, GameRepository, StoreError};
use crate::game::engine::RuleViolation;

/// Identity header honored on the WebSocket handshake and the HTTP
/// endpoint. Authentication that vouches for it is an external concern.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket bind address.
    pub bind_addr: SocketAddr,
    /// HTTP bind address.
    pub http_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Options every new match is created with.
    pub game_options: GameOptions,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            http_addr: "0.0.0.0:8081".parse().unwrap(),
            max_connections: 1000,
            game_options: GameOptions::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Configuration from environment variables, falling back to defaults:
    /// `LOST_CITIES_WS_ADDR`, `LOST_CITIES_HTTP_ADDR`,
    /// `LOST_CITIES_MAX_CONNECTIONS`, `LOST_CITIES_USE_PURPLE`,
    /// `LOST_CITIES_TOTAL_ROUNDS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(addr) = env_parse("LOST_CITIES_WS_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(addr) = env_parse("LOST_CITIES_HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Some(max) = env_parse("LOST_CITIES_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(purple) = env_parse("LOST_CITIES_USE_PURPLE") {
            config.game_options.use_purple = purple;
        }
        if let Some(rounds) = env_parse("LOST_CITIES_TOTAL_ROUNDS") {
            config.game_options.total_rounds = rounds;
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The game server.
///
/// All registries are constructed here and shared with the HTTP router,
/// so both entry paths see the same matches and subscribers.
pub struct GameServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    hub: Arc<SubscriptionHub>,
    queue: Arc<MatchmakingQueue>,
    processor: Arc<MoveProcessor>,
    active_connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Wire a server over the given store and ban list.
    pub fn new(config: ServerConfig, store: Arc<dyn GameRepository>, bans: Arc<dyn BanList>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let hub = Arc::new(SubscriptionHub::new());
        let queue = Arc::new(MatchmakingQueue::new(
            store.clone(),
            bans,
            hub.clone(),
            config.game_options,
        ));
        let processor = Arc::new(MoveProcessor::new(store, hub.clone()));

        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            hub,
            queue,
            processor,
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// The move processor, shared with the HTTP router.
    pub fn processor(&self) -> Arc<MoveProcessor> {
        self.processor.clone()
    }

    /// Run the accept loop until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("game server listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.active_connections.load(Ordering::Relaxed)
                                >= self.config.max_connections
                            {
                                warn!("connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("new connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Signal the accept loop and all connections to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// A receiver that fires when `shutdown` is called, for sibling
    /// services that should stop with the server.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Number of open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Spawn the per-connection task.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let hub = self.hub.clone();
        let queue = self.queue.clone();
        let processor = self.processor.clone();
        let active = self.active_connections.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        active.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            // Pull the optional identity header off the handshake so a
            // reconnecting client can resync without re-queueing.
            let mut header_identity: Option<PlayerId> = None;
            let callback = |req: &Request, resp: Response| {
                header_identity = req
                    .headers()
                    .get(PLAYER_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .filter(|s| !s.is_empty())
                    .map(PlayerId::from);
                Ok(resp)
            };

            let ws_stream = match accept_hdr_async(stream, callback).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("websocket handshake failed for {}: {}", addr, e);
                    active.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            let (close_tx, mut close_rx) = mpsc::channel::<String>(1);

            let mut conn = ConnectionContext {
                conn_id: next_connection_id(),
                identity: None,
                registry,
                hub,
                queue,
                processor,
                sender: msg_tx.clone(),
                close_tx,
            };

            if let Some(identity) = header_identity {
                conn.bind_identity(identity).await;
            }

            // Writer task: everything outbound funnels through one channel.
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => conn.handle_message(client_msg).await,
                                    Err(e) => {
                                        debug!("invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ErrorData::new(
                                            ErrorType::InvalidMessage,
                                            "invalid message format",
                                        ))).await;
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(_))) => {
                                // Transport pings are answered by tungstenite.
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("websocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    reason = close_rx.recv() => {
                        if let Some(reason) = reason {
                            debug!("closing connection {}: {}", addr, reason);
                            let _ = msg_tx.send(ServerMessage::Error(ErrorData {
                                message: reason,
                                error_type: None,
                            })).await;
                        }
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            conn.cleanup().await;
            sender_task.abort();
            active.fetch_sub(1, Ordering::Relaxed);
            debug!("client {} cleaned up", addr);
        });
    }
}

// =============================================================================
// PER-CONNECTION STATE
// =============================================================================

/// One connection's handle on the shared structures, plus the identity it
/// has bound so far. Separated from the socket so dispatch is testable.
struct ConnectionContext {
    conn_id: ConnectionId,
    identity: Option<PlayerId>,
    registry: Arc<SessionRegistry>,
    hub: Arc<SubscriptionHub>,
    queue: Arc<MatchmakingQueue>,
    processor: Arc<MoveProcessor>,
    sender: mpsc::Sender<ServerMessage>,
    close_tx: mpsc::Sender<String>,
}

impl ConnectionContext {
    /// Dispatch one inbound message.
    async fn handle_message(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::FindMatch(data) => {
                if let Some(ref bound) = self.identity {
                    if *bound != data.identity {
                        self.send_error(
                            ErrorType::InvalidMessage,
                            "connection already bound to another identity",
                        )
                        .await;
                        return;
                    }
                } else {
                    self.bind_identity(data.identity.clone()).await;
                }

                self.queue
                    .enqueue(QueueEntry {
                        conn_id: self.conn_id,
                        identity: data.identity,
                        joined_at: Utc::now(),
                        sender: self.sender.clone(),
                    })
                    .await;
            }
            ClientMessage::CancelMatch => {
                self.queue.cancel(self.conn_id).await;
            }
            ClientMessage::SubscribeGame(data) => {
                let Some(identity) = self.identity.clone() else {
                    self.send_unidentified().await;
                    return;
                };
                match self.processor.load_for(data.match_id, &identity).await {
                    Ok(game) => {
                        self.hub
                            .subscribe(
                                &game,
                                Subscriber {
                                    conn_id: self.conn_id,
                                    identity,
                                    sender: self.sender.clone(),
                                },
                            )
                            .await;
                    }
                    Err(e) => self.send_process_error(e).await,
                }
            }
            ClientMessage::GameAction(data) => {
                let Some(identity) = self.identity.clone() else {
                    self.send_unidentified().await;
                    return;
                };
                let mv = match data.action.into_move() {
                    Ok(mv) => mv,
                    Err(e) => {
                        self.send_error(ErrorType::InvalidMessage, &e.to_string()).await;
                        return;
                    }
                };
                if let Err(e) = self.processor.process(data.match_id, &identity, mv).await {
                    self.send_process_error(e).await;
                }
            }
            ClientMessage::RequestGameState(data) => {
                let Some(identity) = self.identity.clone() else {
                    self.send_unidentified().await;
                    return;
                };
                match self.processor.snapshot(data.match_id, &identity).await {
                    Ok(view) => {
                        let _ = self
                            .sender
                            .send(ServerMessage::GameUpdated(GameUpdatedData {
                                match_id: data.match_id,
                                game_state: view,
                            }))
                            .await;
                    }
                    Err(e) => self.send_process_error(e).await,
                }
            }
            ClientMessage::Ping { timestamp } => {
                let _ = self.sender.send(ServerMessage::Pong { timestamp }).await;
            }
        }
    }

    /// Bind an identity to this connection and claim it in the registry,
    /// force-closing any prior connection for the same identity.
    async fn bind_identity(&mut self, identity: PlayerId) {
        self.registry
            .register(
                identity.clone(),
                ConnectionHandle {
                    conn_id: self.conn_id,
                    sender: self.sender.clone(),
                    close_tx: self.close_tx.clone(),
                },
            )
            .await;
        self.identity = Some(identity);
    }

    /// Release everything this connection held: registry entry, queue
    /// entry, and hub subscriptions. A running match is left untouched.
    async fn cleanup(&self) {
        self.queue.remove_connection(self.conn_id).await;
        self.hub.unsubscribe_connection(self.conn_id).await;
        if let Some(ref identity) = self.identity {
            self.registry.unregister(identity, self.conn_id).await;
        }
    }

    async fn send_unidentified(&self) {
        self.send_error(
            ErrorType::InvalidMessage,
            "no identity bound to this connection",
        )
        .await;
    }

    async fn send_error(&self, error_type: ErrorType, message: &str) {
        let _ = self
            .sender
            .send(ServerMessage::Error(ErrorData::new(error_type, message)))
            .await;
    }

    async fn send_process_error(&self, e: ProcessError) {
        let data = match e {
            ProcessError::Rule(ref violation) => {
                if matches!(violation, RuleViolation::NotAParticipant) {
                    ErrorData::new(ErrorType::NotAParticipant, violation.to_string())
                } else {
                    ErrorData::rule_violation(violation)
                }
            }
            ProcessError::NotAParticipant => {
                ErrorData::new(ErrorType::NotAParticipant, e.to_string())
            }
            ProcessError::Store(StoreError::MatchNotFound(_)) => {
                ErrorData::new(ErrorType::MatchNotFound, e.to_string())
            }
            ProcessError::Store(_) => ErrorData::new(ErrorType::Internal, e.to_string()),
        };
        let _ = self.sender.send(ServerMessage::Error(data)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::{
        ActionPayload, FindMatchData, GameActionData, QueueStatus, RequestGameStateData,
        SubscribeGameData,
    };
    use crate::store::{InMemoryGameStore, NoBans};

    fn server() -> GameServer {
        GameServer::new(
            ServerConfig::default(),
            Arc::new(InMemoryGameStore::with_entropy(21)),
            Arc::new(NoBans),
        )
    }

    /// A connection context wired to the server's shared structures,
    /// bypassing the socket layer.
    fn connect(server: &GameServer) -> (ConnectionContext, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(64);
        let (close_tx, _close_rx) = mpsc::channel(1);
        let conn = ConnectionContext {
            conn_id: next_connection_id(),
            identity: None,
            registry: server.registry.clone(),
            hub: server.hub.clone(),
            queue: server.queue.clone(),
            processor: server.processor.clone(),
            sender: tx,
            close_tx,
        };
        (conn, rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        rx.recv().await.expect("expected a message")
    }

    /// Drive two connections through matchmaking into a live match.
    /// Returns both contexts with their receivers drained to quiet.
    async fn paired_match(
        server: &GameServer,
    ) -> (
        (ConnectionContext, mpsc::Receiver<ServerMessage>),
        (ConnectionContext, mpsc::Receiver<ServerMessage>),
        crate::game::state::MatchId,
    ) {
        let (mut alice, mut alice_rx) = connect(server);
        let (mut bob, mut bob_rx) = connect(server);

        alice
            .handle_message(ClientMessage::FindMatch(FindMatchData {
                identity: PlayerId::from("alice"),
            }))
            .await;
        bob.handle_message(ClientMessage::FindMatch(FindMatchData {
            identity: PlayerId::from("bob"),
        }))
        .await;

        // alice: searching, matchFound, gameSubscribed, gameUpdated
        let mut match_id = None;
        for rx in [&mut alice_rx, &mut bob_rx] {
            loop {
                match recv(rx).await {
                    ServerMessage::GameUpdated(data) => {
                        match_id = Some(data.match_id);
                        break;
                    }
                    ServerMessage::Error(e) => panic!("unexpected error: {e:?}"),
                    _ => {}
                }
            }
        }

        ((alice, alice_rx), (bob, bob_rx), match_id.unwrap())
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert!(!config.game_options.use_purple);
        assert_eq!(config.game_options.total_rounds, 3);
    }

    #[tokio::test]
    async fn test_server_creation_and_shutdown() {
        let server = server();
        assert_eq!(server.connection_count(), 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_find_match_binds_identity_and_pairs() {
        let server = server();
        let ((alice, _a_rx), (bob, _b_rx), _match_id) = paired_match(&server).await;

        assert_eq!(alice.identity, Some(PlayerId::from("alice")));
        assert_eq!(bob.identity, Some(PlayerId::from("bob")));
        assert!(server.registry.is_connected(&PlayerId::from("alice")).await);
        assert!(server.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_game_action_flows_to_subscribers() {
        let server = server();
        let ((mut alice, mut alice_rx), (mut bob, mut bob_rx), match_id) =
            paired_match(&server).await;

        // Find whose turn it is and have that side act.
        let game = server.processor.load_for(match_id, &PlayerId::from("alice")).await.unwrap();
        let current = game.current_player.clone();
        let card_id = game.area(&current).hand[0].id;

        let (actor, actor_rx, other_rx) = if current == PlayerId::from("alice") {
            (&mut alice, &mut alice_rx, &mut bob_rx)
        } else {
            (&mut bob, &mut bob_rx, &mut alice_rx)
        };

        actor
            .handle_message(ClientMessage::GameAction(GameActionData {
                match_id,
                action: ActionPayload::DiscardCard { card_id },
            }))
            .await;

        for rx in [actor_rx, other_rx] {
            let msg = recv(rx).await;
            assert!(matches!(msg, ServerMessage::GameUpdated(_)), "got {msg:?}");
        }
    }

    #[tokio::test]
    async fn test_action_without_identity_rejected() {
        let server = server();
        let (mut conn, mut rx) = connect(&server);

        conn.handle_message(ClientMessage::GameAction(GameActionData {
            match_id: crate::game::state::MatchId::generate(),
            action: ActionPayload::Surrender,
        }))
        .await;

        let ServerMessage::Error(err) = recv(&mut rx).await else {
            panic!("expected error");
        };
        assert_eq!(err.error_type, Some(ErrorType::InvalidMessage));
    }

    #[tokio::test]
    async fn test_rebinding_other_identity_rejected() {
        let server = server();
        let (mut conn, mut rx) = connect(&server);

        conn.handle_message(ClientMessage::FindMatch(FindMatchData {
            identity: PlayerId::from("alice"),
        }))
        .await;
        let _searching = recv(&mut rx).await;

        conn.handle_message(ClientMessage::FindMatch(FindMatchData {
            identity: PlayerId::from("mallory"),
        }))
        .await;
        let ServerMessage::Error(err) = recv(&mut rx).await else {
            panic!("expected error");
        };
        assert!(err.message.contains("another identity"));
    }

    #[tokio::test]
    async fn test_cancel_match_message() {
        let server = server();
        let (mut conn, mut rx) = connect(&server);

        conn.handle_message(ClientMessage::FindMatch(FindMatchData {
            identity: PlayerId::from("alice"),
        }))
        .await;
        conn.handle_message(ClientMessage::CancelMatch).await;

        assert!(server.queue.is_empty().await);
        let _searching = recv(&mut rx).await;
        let ServerMessage::MatchmakingStatus(status) = recv(&mut rx).await else {
            panic!("expected status");
        };
        assert_eq!(status.status, QueueStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_resync_after_resubscribe() {
        let server = server();
        let ((_alice, _a_rx), (_bob, _b_rx), match_id) = paired_match(&server).await;

        // A fresh connection identifying as alice can subscribe and resync.
        let (mut reconnected, mut rx) = connect(&server);
        reconnected.bind_identity(PlayerId::from("alice")).await;
        reconnected
            .handle_message(ClientMessage::SubscribeGame(SubscribeGameData { match_id }))
            .await;

        assert!(matches!(recv(&mut rx).await, ServerMessage::GameSubscribed(_)));
        assert!(matches!(recv(&mut rx).await, ServerMessage::GameUpdated(_)));

        reconnected
            .handle_message(ClientMessage::RequestGameState(RequestGameStateData { match_id }))
            .await;
        let ServerMessage::GameUpdated(data) = recv(&mut rx).await else {
            panic!("expected snapshot");
        };
        assert_eq!(data.game_state.you.identity, PlayerId::from("alice"));
    }

    #[tokio::test]
    async fn test_outsider_cannot_subscribe() {
        let server = server();
        let ((_alice, _a_rx), (_bob, _b_rx), match_id) = paired_match(&server).await;

        let (mut mallory, mut rx) = connect(&server);
        mallory.bind_identity(PlayerId::from("mallory")).await;
        mallory
            .handle_message(ClientMessage::SubscribeGame(SubscribeGameData { match_id }))
            .await;

        let ServerMessage::Error(err) = recv(&mut rx).await else {
            panic!("expected error");
        };
        assert_eq!(err.error_type, Some(ErrorType::NotAParticipant));
    }

    #[tokio::test]
    async fn test_disconnect_cleanup_purges_everything() {
        let server = server();
        let (mut conn, _rx) = connect(&server);

        conn.handle_message(ClientMessage::FindMatch(FindMatchData {
            identity: PlayerId::from("alice"),
        }))
        .await;
        assert_eq!(server.queue.len().await, 1);

        conn.cleanup().await;
        assert!(server.queue.is_empty().await);
        assert!(!server.registry.is_connected(&PlayerId::from("alice")).await);
    }
}
