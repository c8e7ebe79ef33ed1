//! Duoplay Server - two-player matchmaking and turn-based game rooms
//!
//! Serves the REST API (users, rooms, game catalog) and the two websocket
//! entry points: the matchmaking queue and direct room seats. A scanner task
//! pairs queued players; a sweeper drops rooms nobody joined.

mod app;
mod config;
mod error;
mod game;
mod http;
mod matchmaking;
mod room;
mod store;
mod util;
mod ws;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    // Create application state
    let state = AppState::new(config.clone());

    info!(
        addr = %config.server_addr,
        games = ?state.games.catalog().iter().map(|g| g.name.to_string()).collect::<Vec<_>>(),
        scan_interval_ms = config.match_scan_interval.as_millis() as u64,
        room_idle_ttl_secs = config.room_idle_ttl.as_secs(),
        "Starting duoplay server"
    );

    spawn_background_tasks(&state);

    let router = build_router(state);
    let listener = TcpListener::bind(config.server_addr).await?;
    info!(
        addr = %config.server_addr,
        "Accepting players on /matchmaking/ws and /rooms/:room_id/ws"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Matchmaking scanner and abandoned-room sweeper
fn spawn_background_tasks(state: &AppState) {
    let matchmaking = state.matchmaking.clone();
    tokio::spawn(async move {
        matchmaking.run().await;
    });

    let rooms = state.rooms.clone();
    let ttl = state.config.room_idle_ttl;
    tokio::spawn(async move {
        rooms.run_sweeper(ttl).await;
    });
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
