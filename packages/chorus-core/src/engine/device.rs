//! The seam between the reconciliation engine and local audio hardware.

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{TrackId, TransferState};

/// Errors surfaced by a local playback device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device has no track with this identifier loaded.
    #[error("track not loaded: {0}")]
    UnknownTrack(TrackId),

    /// The device refused to start playback (hardware busy, autoplay
    /// policy, ...). Logged by the engine, never retried.
    #[error("playback start refused: {0}")]
    StartRefused(String),
}

/// Live transport state of one local track.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTrackState {
    pub filename: TrackId,
    /// Position in seconds.
    pub time: f64,
    pub is_playing: bool,
}

impl From<LocalTrackState> for TransferState {
    fn from(local: LocalTrackState) -> Self {
        TransferState {
            filename: local.filename,
            time: local.time,
            is_playing: local.is_playing,
        }
    }
}

/// A local multi-track playback device.
///
/// One implementation wraps whatever actually makes sound (a browser's
/// audio elements, a headless deck); the engine only drives transport.
/// Calls are best-effort: the engine logs failures and moves on.
#[async_trait]
pub trait PlaybackDevice: Send + Sync {
    /// Identifiers of every track loaded on this device.
    fn track_ids(&self) -> Vec<TrackId>;

    /// Starts playback of the given track at its current position.
    async fn play(&self, track: &TrackId) -> Result<(), DeviceError>;

    /// Pauses the given track.
    async fn pause(&self, track: &TrackId) -> Result<(), DeviceError>;

    /// Moves the given track's position, in seconds.
    async fn seek(&self, track: &TrackId, seconds: f64) -> Result<(), DeviceError>;

    /// The currently playing track, if any.
    async fn active_track(&self) -> Option<LocalTrackState>;
}
