//! HTTP/WebSocket API layer.
//!
//! Thin handlers over the group registry and media library. This module
//! provides router construction and server startup.

use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::coordinator::GroupRegistry;
use crate::library::MediaLibrary;
use crate::protocol_constants::FALLBACK_PORT_RANGE;

pub mod http;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// A thin wrapper over the services; all coordination logic lives in
/// the group actors themselves.
#[derive(Clone)]
pub struct AppState {
    /// Per-group actor registry.
    pub groups: Arc<GroupRegistry>,
    /// Media library backing the track list and byte serving.
    pub library: Arc<MediaLibrary>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let library = Arc::new(MediaLibrary::new(&config.media_dir));
        Self {
            groups: GroupRegistry::new(),
            library,
            ws_manager: Arc::new(WsConnectionManager::new()),
            config: Arc::new(config),
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred = state.config.preferred_port;
    let (start, end) = FALLBACK_PORT_RANGE;
    let (port, listener) = if preferred > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => (preferred, listener),
            Err(e) => {
                log::warn!(
                    "[Server] Port {} unavailable ({}), scanning {}-{}",
                    preferred,
                    e,
                    start,
                    end
                );
                find_available_port(start, end).await?
            }
        }
    } else {
        find_available_port(start, end).await?
    };

    log::info!("Server listening on http://0.0.0.0:{}", port);
    log::info!(
        "[Server] Media directory: {}",
        state.library.root().display()
    );
    let app = http::create_router(state);

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
