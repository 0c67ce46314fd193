mod config;
mod connection;
mod error;
mod handler;
mod player;
mod queue;
mod registry;
mod server;
mod tick;

use std::sync::Arc;

use config::ServerConfig;
use handler::GameHandler;
use mcj_proto::packets::{GAME_VERSION, PROTOCOL_VERSION};
use server::Shared;
use tick::TickLoop;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "server.toml".into());
    let config = match ServerConfig::load(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "mcj-server v{} ({GAME_VERSION}, protocol {PROTOCOL_VERSION}) starting on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.address,
        config.server.port
    );
    info!("MOTD: {}", config.server.motd);
    info!("Max players: {}", config.server.max_players);
    info!("Tick interval: {:?}", config.network.tick_interval());

    let favicon = config
        .server
        .favicon
        .as_deref()
        .and_then(|path| match server::load_favicon(path) {
            Ok(uri) => Some(uri),
            Err(e) => {
                warn!("Ignoring favicon {path}: {e}");
                None
            }
        });

    let addr = format!("{}:{}", config.server.address, config.server.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    let shared = Arc::new(Shared::new(config, favicon));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Handle Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let tick_loop = TickLoop::new(shared.clone(), GameHandler);
    let tick_task = tokio::spawn(tick_loop.run(shutdown_rx.clone()));

    server::run_listener(listener, shared, shutdown_rx).await;
    if let Err(e) = tick_task.await {
        error!("Tick loop panicked: {e}");
    }
    info!("Server shut down.");
}
