//! Arena Sync - broadcast relay and headless peer
//!
//! `arena_sync relay` (default) serves the WebSocket relay peers publish
//! through. `arena_sync client` joins a match as a wandering bot.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_sync::app::AppState;
use arena_sync::config::Config;
use arena_sync::game::level::Level;
use arena_sync::game::replay::{ReplayRecorder, REPLAY_FRAME_INTERVAL_MS};
use arena_sync::game::runner::{MatchRunner, TracingRenderer, WanderBot};
use arena_sync::game::session::GameSession;
use arena_sync::http::build_router;
use arena_sync::net::{Channel, PeerSync, WsChannel};
use arena_sync::util::time::{init_process_time, unix_millis};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize process time tracking
    init_process_time();

    match std::env::args().nth(1).as_deref() {
        None | Some("relay") => run_relay(config).await,
        Some("client") => run_client(config).await,
        Some(other) => anyhow::bail!("unknown mode {other:?}, expected `relay` or `client`"),
    }
}

async fn run_relay(config: Config) -> anyhow::Result<()> {
    info!("Starting Arena Sync relay");
    info!("Relay address: {}", config.relay_addr);

    let addr = config.relay_addr;
    let state = AppState::new(config);
    let router = build_router(state);

    let listener = TcpListener::bind(addr).await?;

    info!("Relay listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay shutdown complete");
    Ok(())
}

async fn run_client(config: Config) -> anyhow::Result<()> {
    info!(
        relay = %config.relay_url,
        match_id = config.match_id,
        player_id = config.player_id,
        "Starting headless client"
    );

    let channel = Arc::new(
        WsChannel::connect(&config.relay_url)
            .await
            .with_context(|| format!("connecting to relay at {}", config.relay_url))?,
    );

    let seed = unix_millis() ^ config.player_id;
    let session = GameSession::new(config.player_id, config.player_name.clone(), Level::arena(), seed);
    let sync = PeerSync::new(
        config.match_id,
        config.player_id,
        channel.clone() as Arc<dyn Channel>,
        config.sync_config(),
    );
    let mut runner = MatchRunner::new(
        session,
        sync,
        TracingRenderer::new(u64::from(config.simulation_tps)),
        WanderBot::new(seed),
        config.simulation_tps,
    );
    if config.replay_path.is_some() {
        runner = runner.with_replay(ReplayRecorder::new(config.match_id, REPLAY_FRAME_INTERVAL_MS));
    }

    let result = runner.run(shutdown_signal()).await;

    // Leave and unsubscribe are queued, push them out before exiting
    channel.close().await;

    if let (Some(path), Some(replay)) = (&config.replay_path, runner.replay()) {
        tokio::fs::write(path, replay.to_json()?)
            .await
            .with_context(|| format!("writing replay to {}", path.display()))?;
        info!(path = %path.display(), frames = replay.frames.len(), "Replay saved");
    }

    match result {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                shots = summary.shots,
                hits = summary.hits,
                deaths = summary.deaths,
                "Client shutdown complete"
            );
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Client stopped with error");
            Err(e.into())
        }
    }
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
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
