//! Client-side reconciliation of authoritative group state.
//!
//! The engine keeps a local mirror of the coordinator's [`GroupState`]
//! and translates broadcasts into concrete transport actions on a
//! [`PlaybackDevice`], while making sure the device events caused by its
//! own actions are not re-reported upward as user intent (the feedback
//! loop problem).
//!
//! Echo handling is an explicit state machine rather than bare timers:
//!
//! - `ApplyingRemote`: the engine is driving the device; callbacks within
//!   a bounded window are its own echoes.
//! - `AwaitingEcho`: a local play was reported upward; the confirming
//!   broadcast closes the window explicitly, a deadline bounds it.

mod device;

pub use device::{DeviceError, LocalTrackState, PlaybackDevice};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::protocol::{ClientId, ClientMessage, GroupState, PullSource, TrackId};
use crate::protocol_constants::{APPLY_SUPPRESS_WINDOW_MS, PLAY_ECHO_WINDOW_MS};

/// Suppression state machine for the feedback-loop problem.
#[derive(Debug, Clone, PartialEq)]
enum EchoGuard {
    /// Local device events are genuine user actions.
    Idle,
    /// The engine is (or just finished) driving the device; local events
    /// before the deadline are echoes.
    ApplyingRemote { until: Instant },
    /// A local play was reported upward. `applying_until` bounds the
    /// echo-callback window from pausing sibling tracks; `until` bounds
    /// how long a confirming broadcast skips re-driving the device.
    AwaitingEcho {
        applying_until: Instant,
        until: Instant,
    },
}

/// What applying an authoritative state amounted to, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No current track: every local track was paused.
    PausedAll,
    /// The group's track is not loaded on this device; nothing to do.
    TrackUnavailable,
    /// The broadcast merely confirmed this client's own play action;
    /// bookkeeping updated, device untouched.
    EchoConfirmed,
    /// Device aligned to the authoritative state.
    Synced {
        /// Whether this device is the one actually emitting audio.
        emitting: bool,
    },
}

/// One row of the roster view.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub client_id: ClientId,
    pub is_self: bool,
    pub is_active: bool,
    /// Set only when this entry is active and the group is playing.
    pub now_playing: Option<TrackId>,
}

/// Client-side reconciliation engine.
///
/// Owned exclusively by one connection; never shared. Time is injected
/// by the caller so suppression windows are deterministic under test.
pub struct ReconcilerEngine {
    device: Arc<dyn PlaybackDevice>,
    client_id: Option<ClientId>,
    mirror: GroupState,
    peers: Vec<ClientId>,
    guard: EchoGuard,
}

impl ReconcilerEngine {
    pub fn new(device: Arc<dyn PlaybackDevice>) -> Self {
        Self {
            device,
            client_id: None,
            mirror: GroupState::default(),
            peers: Vec::new(),
            guard: EchoGuard::Idle,
        }
    }

    /// Records the server-assigned identity from the `registered` reply.
    pub fn on_registered(&mut self, client_id: ClientId) {
        log::info!("[Engine] Registered as {}", client_id);
        self.client_id = Some(client_id);
    }

    /// Replaces the known roster.
    pub fn on_client_list(&mut self, mut clients: Vec<ClientId>) {
        clients.sort();
        self.peers = clients;
    }

    /// This client's id, once registered.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// The last-known authoritative state.
    pub fn mirror(&self) -> &GroupState {
        &self.mirror
    }

    /// Applies an authoritative broadcast to the local device.
    pub async fn apply_authoritative(&mut self, state: GroupState, now: Instant) -> ApplyOutcome {
        let confirms_self =
            self.client_id.is_some() && state.active_client_id == self.client_id;
        let echo_open =
            matches!(&self.guard, EchoGuard::AwaitingEcho { until, .. } if now < *until);

        // The mirror always tracks the server, even when the device is
        // left alone.
        self.mirror = state;

        if echo_open && confirms_self {
            // Our own play action coming back around: the device is
            // already in the right state, re-driving it would stutter.
            log::debug!("[Engine] Broadcast confirmed own play; device untouched");
            self.guard = EchoGuard::Idle;
            return ApplyOutcome::EchoConfirmed;
        }

        let Some(target) = self.mirror.current_track.clone() else {
            // Still driving the device; its pause callbacks are echoes.
            self.guard = EchoGuard::ApplyingRemote {
                until: now + Duration::from_millis(APPLY_SUPPRESS_WINDOW_MS),
            };
            for track in self.device.track_ids() {
                if let Err(e) = self.device.pause(&track).await {
                    log::warn!("[Engine] Pause failed for {}: {}", track, e);
                }
            }
            return ApplyOutcome::PausedAll;
        };

        let tracks = self.device.track_ids();
        if !tracks.contains(&target) {
            log::debug!("[Engine] Track {} not available locally", target);
            return ApplyOutcome::TrackUnavailable;
        }

        // Everything below is the engine talking to the device; the
        // window absorbs the asynchronous callbacks it triggers.
        self.guard = EchoGuard::ApplyingRemote {
            until: now + Duration::from_millis(APPLY_SUPPRESS_WINDOW_MS),
        };

        // At most one local track may ever be positioned off zero.
        for other in tracks.iter().filter(|t| **t != target) {
            if let Err(e) = self.device.pause(other).await {
                log::warn!("[Engine] Pause failed for {}: {}", other, e);
            }
            if let Err(e) = self.device.seek(other, 0.0).await {
                log::warn!("[Engine] Rewind failed for {}: {}", other, e);
            }
        }

        if let Err(e) = self.device.seek(&target, self.mirror.current_time).await {
            log::warn!("[Engine] Seek failed for {}: {}", target, e);
        }

        let mut emitting = false;
        if self.mirror.is_playing && confirms_self {
            // Only the active client makes sound.
            match self.device.play(&target).await {
                Ok(()) => emitting = true,
                // Best-effort: logged, mirror untouched, no retry, no
                // upward report.
                Err(e) => log::error!("[Engine] Playback start failed for {}: {}", target, e),
            }
        } else if let Err(e) = self.device.pause(&target).await {
            log::warn!("[Engine] Pause failed for {}: {}", target, e);
        }

        ApplyOutcome::Synced { emitting }
    }

    /// Handles a user-initiated play on the local device.
    ///
    /// Returns the transport event to report upward, or `None` when the
    /// callback is an echo of the engine's own device driving.
    pub async fn local_play(
        &mut self,
        filename: TrackId,
        time: f64,
        now: Instant,
    ) -> Option<ClientMessage> {
        if self.is_suppressed(now) {
            log::debug!("[Engine] Suppressed echo play for {}", filename);
            return None;
        }

        // Quiet sibling tracks before claiming authority; their pause
        // callbacks fall inside the window opened below.
        for other in self
            .device
            .track_ids()
            .into_iter()
            .filter(|t| *t != filename)
        {
            if let Err(e) = self.device.pause(&other).await {
                log::warn!("[Engine] Pause failed for {}: {}", other, e);
            }
            if let Err(e) = self.device.seek(&other, 0.0).await {
                log::warn!("[Engine] Rewind failed for {}: {}", other, e);
            }
        }

        // Optimistic: the UI shows authority before the round trip lands.
        self.mirror.is_playing = true;
        self.mirror.current_track = Some(filename.clone());
        self.mirror.current_time = time;
        self.mirror.active_client_id = self.client_id.clone();

        self.guard = EchoGuard::AwaitingEcho {
            applying_until: now + Duration::from_millis(APPLY_SUPPRESS_WINDOW_MS),
            until: now + Duration::from_millis(PLAY_ECHO_WINDOW_MS),
        };

        Some(ClientMessage::Play { filename, time })
    }

    /// Handles a user-initiated pause; the mirror is updated by the
    /// coordinator's broadcast, not locally.
    pub fn local_pause(&mut self, time: f64, now: Instant) -> Option<ClientMessage> {
        if self.is_suppressed(now) {
            return None;
        }
        Some(ClientMessage::Pause {
            time,
            filename: None,
        })
    }

    /// Handles a user-initiated seek; forwarded verbatim.
    pub fn local_seeked(&mut self, time: f64, now: Instant) -> Option<ClientMessage> {
        if self.is_suppressed(now) {
            return None;
        }
        Some(ClientMessage::Seeked {
            time,
            filename: None,
        })
    }

    /// A peer asked for this client's live state; answer with a handoff
    /// if anything is actually playing here.
    pub async fn on_request_current_state(&self, requester: ClientId) -> Option<ClientMessage> {
        let live = self.device.active_track().await?;
        Some(ClientMessage::TransferRequest {
            target_client_id: requester,
            state: live.into(),
        })
    }

    /// User selected their own roster row: adopt whoever is playing.
    pub fn pull_from_playing(&self) -> ClientMessage {
        ClientMessage::PullRequest {
            source_client_id: PullSource::Any,
        }
    }

    /// User selected a peer's roster row: hand the locally playing track
    /// over to that peer. No-op when nothing is playing here.
    pub async fn transfer_to(&self, peer: ClientId) -> Option<ClientMessage> {
        let live = self.device.active_track().await?;
        Some(ClientMessage::TransferRequest {
            target_client_id: peer,
            state: live.into(),
        })
    }

    /// Builds the roster view from the mirror.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.peers
            .iter()
            .map(|id| {
                let is_active = self.mirror.active_client_id.as_deref() == Some(id.as_str());
                RosterEntry {
                    client_id: id.clone(),
                    is_self: self.client_id.as_deref() == Some(id.as_str()),
                    is_active,
                    now_playing: if is_active && self.mirror.is_playing {
                        self.mirror.current_track.clone()
                    } else {
                        None
                    },
                }
            })
            .collect()
    }

    fn is_suppressed(&self, now: Instant) -> bool {
        match &self.guard {
            EchoGuard::Idle => false,
            EchoGuard::ApplyingRemote { until } => now < *until,
            EchoGuard::AwaitingEcho { applying_until, .. } => now < *applying_until,
        }
    }
}
