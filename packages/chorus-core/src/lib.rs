//! Chorus Core - shared library for Chorus.
//!
//! This crate provides the core functionality for Chorus, a group
//! playback synchronization system: many clients share one logical
//! playback position and exactly one of them emits audio at a time.
//! It is used by both the standalone server and the headless player.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`protocol`]: Wire message and state schema shared by both sides
//! - [`coordinator`]: Server-side per-group actors owning authoritative state
//! - [`engine`]: Client-side reconciliation of broadcasts onto a playback device
//! - [`library`]: Media directory scanning for the shared track list
//! - [`api`]: HTTP/WebSocket surface
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! [`PlaybackDevice`](engine::PlaybackDevice) decouples the
//! reconciliation engine from any concrete audio backend; the headless
//! player provides a logging implementation and GUI clients bring their
//! own.

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod library;
pub mod protocol;
pub mod protocol_constants;

// Re-export commonly used types at the crate root
pub use config::Config;
pub use coordinator::{GroupCommand, GroupRegistry, GroupSnapshot};
pub use engine::{
    ApplyOutcome, DeviceError, LocalTrackState, PlaybackDevice, ReconcilerEngine, RosterEntry,
};
pub use error::{ChorusError, ChorusResult, ErrorCode};
pub use library::MediaLibrary;
pub use protocol::{
    ClientId, ClientMessage, GroupId, GroupState, PullSource, ServerMessage, TrackId, TransferState,
};

// Re-export API types
pub use api::{start_server, AppState, ServerError, WsConnectionManager};
