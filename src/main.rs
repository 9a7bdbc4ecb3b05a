//! Lost Cities Server
//!
//! Binary entry point: wires the in-memory store into the WebSocket
//! server and the HTTP move endpoint, then runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lost_cities::network::http;
use lost_cities::store::NoBans;
use lost_cities::{GameServer, InMemoryGameStore, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!("Lost Cities Server v{}", VERSION);
    info!(
        "options: purple expedition {}, {} rounds per match",
        if config.game_options.use_purple { "on" } else { "off" },
        config.game_options.total_rounds
    );

    let store = Arc::new(InMemoryGameStore::new());
    let server = Arc::new(GameServer::new(config.clone(), store, Arc::new(NoBans)));

    let ctrl_c_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            ctrl_c_server.shutdown();
        }
    });

    // HTTP endpoint shares the WebSocket server's move processor and
    // stops with it.
    let mut http_shutdown = server.subscribe_shutdown();
    let http_task = tokio::spawn(http::serve(
        config.http_addr,
        server.processor(),
        async move {
            let _ = http_shutdown.recv().await;
        },
    ));

    server.run().await.context("websocket server failed")?;
    if let Ok(Err(e)) = http_task.await {
        tracing::error!("http endpoint failed: {}", e);
    }

    info!("server stopped");
    Ok(())
}
