//! WebSocket connection tracking and management.
//!
//! - `WsConnectionManager` tracks every live socket and can force-close
//!   them all on shutdown.
//! - `ConnectionGuard` is an RAII guard for automatic cleanup on
//!   disconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::protocol::{ClientId, GroupId};

/// Per-connection metadata, filled in once the client registers.
#[derive(Default)]
struct ConnectionInfo {
    client_id: Option<ClientId>,
    group_id: Option<GroupId>,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe and designed for concurrent access from multiple
/// WebSocket handlers. Uses hierarchical cancellation tokens for
/// efficient force-close of all connections.
pub struct WsConnectionManager {
    /// Active connections: connection_id -> ConnectionInfo
    connections: DashMap<String, ConnectionInfo>,
    /// Counter for generating unique connection IDs.
    next_id: AtomicU64,
    /// Global cancellation token. Wrapped in RwLock so it can be
    /// replaced after close_all().
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a new connection and returns a guard for RAII cleanup.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn_id = format!("ws-{}", id);
        let cancel_token = self.global_cancel.read().child_token();

        self.connections
            .insert(conn_id.clone(), ConnectionInfo::default());
        log::info!(
            "[WS] Connection registered: {} (total: {})",
            conn_id,
            self.connections.len()
        );

        ConnectionGuard {
            id: conn_id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    /// Records which client and group a connection belongs to, for
    /// shutdown logging.
    pub fn note_registration(&self, conn_id: &str, client_id: &ClientId, group_id: &GroupId) {
        if let Some(mut info) = self.connections.get_mut(conn_id) {
            info.client_id = Some(client_id.clone());
            info.group_id = Some(group_id.clone());
        }
    }

    fn unregister(&self, id: &str) {
        if let Some((_, info)) = self.connections.remove(id) {
            match (info.client_id, info.group_id) {
                (Some(client), Some(group)) => log::info!(
                    "[WS] Connection unregistered: {} (client {} in group {}, remaining: {})",
                    id,
                    client,
                    group,
                    self.connections.len()
                ),
                _ => log::info!(
                    "[WS] Connection unregistered: {} (never registered, remaining: {})",
                    id,
                    self.connections.len()
                ),
            }
        }
    }

    /// Returns the number of active connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Force-closes all connections.
    ///
    /// Cancels the global token, signalling every handler to terminate
    /// gracefully, then installs a fresh token so new connections can
    /// still be accepted.
    ///
    /// Returns the number of connections that were signaled to close.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] Force-closing {} connection(s)", count);
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        } else {
            log::info!("[WS] close_all called but no connections to close");
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that unregisters a connection when dropped.
///
/// This ensures connections are always cleaned up, even if the handler
/// panics or exits early.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    /// Token for this specific connection - cancelled on force-close.
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    /// Returns the connection ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the cancellation token for this connection.
    ///
    /// Use this in `tokio::select!` to detect force-close requests.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_drop_unregisters() {
        let manager = Arc::new(WsConnectionManager::new());
        let guard = manager.register();
        assert_eq!(manager.connection_count(), 1);
        drop(guard);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn close_all_cancels_live_tokens_and_replaces_the_root() {
        let manager = Arc::new(WsConnectionManager::new());
        let before = manager.register();
        assert_eq!(manager.close_all(), 1);
        assert!(before.cancel_token().is_cancelled());

        // New connections get a fresh, uncancelled token.
        let after = manager.register();
        assert!(!after.cancel_token().is_cancelled());
    }
}
