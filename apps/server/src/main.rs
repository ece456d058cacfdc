//! Chorus Server - standalone group playback coordinator.
//!
//! Hosts the WebSocket coordination endpoint and serves the shared media
//! library over HTTP. Designed to run as a background daemon; all
//! playback happens on the connected clients.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use chorus_core::{start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Chorus Server - group playback synchronization coordinator.
#[derive(Parser, Debug)]
#[command(name = "chorus-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CHORUS_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "CHORUS_BIND_PORT")]
    port: Option<u16>,

    /// Media directory served to clients (overrides config file).
    #[arg(short = 'm', long, env = "CHORUS_MEDIA_DIR")]
    media_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Chorus Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(media_dir) = args.media_dir {
        config.media_dir = media_dir;
    }

    log::info!(
        "Configuration: bind_port={}, media_dir={}",
        config.bind_port,
        config.media_dir.display()
    );

    if !config.media_dir.is_dir() {
        log::warn!(
            "Media directory {} does not exist; clients will see an empty track list",
            config.media_dir.display()
        );
    }

    let app_state = AppState::new(config.to_core_config());
    let ws_manager = app_state.ws_manager.clone();

    // The server owns no audio path; coordination is cheap enough for
    // the main runtime.
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Close every socket; the handlers run their leave path, so group
    // actors wind down on their own.
    ws_manager.close_all();
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
