//! Fixed protocol constants shared by coordinator and engine.

// ─────────────────────────────────────────────────────────────────────────────
// Reconciliation Suppression Windows
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded window after the engine drives the local device (ms).
///
/// Device callbacks fire asynchronously after a programmatic play/pause/seek;
/// callbacks landing inside this window are echoes of the engine's own
/// actions and must not be re-reported as user events.
pub const APPLY_SUPPRESS_WINDOW_MS: u64 = 100;

/// Bounded window after reporting a local play upward (ms).
///
/// While open, a broadcast that merely confirms this client as the active
/// one updates bookkeeping without re-driving the already-correct device.
/// Closed early by the confirming broadcast itself.
pub const PLAY_ECHO_WINDOW_MS: u64 = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Media Library
// ─────────────────────────────────────────────────────────────────────────────

/// File extensions the library treats as playable tracks.
pub const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "aac", "flac", "ogg", "opus"];

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
///
/// Clients probe /health and expect this exact string to identify a
/// Chorus coordinator.
pub const SERVICE_ID: &str = "chorus";

// ─────────────────────────────────────────────────────────────────────────────
// Networking
// ─────────────────────────────────────────────────────────────────────────────

/// Default WebSocket/HTTP port when none is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Port range scanned when the configured port is 0 (auto).
pub const FALLBACK_PORT_RANGE: (u16, u16) = (8080, 8090);
