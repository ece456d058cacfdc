//! Wire protocol shared by the coordinator and the reconciliation engine.
//!
//! Messages travel as JSON over a persistent, ordered WebSocket per client.
//! Both directions use a closed tagged enum dispatched on a `type` field, so
//! malformed or unknown messages fail to parse at the boundary instead of
//! being silently mis-dispatched. Field names follow the browser client's
//! conventions (`groupID`, `activeClientID`, ...) so existing web clients
//! stay wire-compatible.

use serde::{Deserialize, Serialize};

/// Opaque group identifier chosen by the user (shared password/session id).
pub type GroupId = String;

/// Opaque client identifier, assigned by the server on register.
pub type ClientId = String;

/// Track identifier - the media file name as listed by the library.
pub type TrackId = String;

/// The single authoritative transport record for one group.
///
/// Owned and mutated exclusively by the group's coordinator actor; clients
/// hold read-only mirrors received via `globalState` broadcasts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupState {
    /// Whether the active client is currently emitting audio.
    pub is_playing: bool,
    /// The track the group has converged on, if any.
    pub current_track: Option<TrackId>,
    /// Playback position in seconds. Advisory: jumps on seek and handoff.
    pub current_time: f64,
    /// The one client authorized to emit audio and advance the position.
    #[serde(rename = "activeClientID")]
    pub active_client_id: Option<ClientId>,
}

impl GroupState {
    /// Checks the core invariant: playing implies an active client is set.
    pub fn playing_implies_active(&self) -> bool {
        !self.is_playing || self.active_client_id.is_some()
    }
}

/// Transport snapshot carried by a handoff request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferState {
    pub filename: TrackId,
    /// Position in seconds at the moment of capture.
    pub time: f64,
    pub is_playing: bool,
}

/// Source selector for a pull request: a concrete peer, or whichever
/// client is currently playing.
#[derive(Debug, Clone, PartialEq)]
pub enum PullSource {
    /// Resolve to the active client (only while it is playing).
    Any,
    /// Ask this specific client, regardless of play state.
    Client(ClientId),
}

impl From<String> for PullSource {
    fn from(value: String) -> Self {
        if value == "any" {
            PullSource::Any
        } else {
            PullSource::Client(value)
        }
    }
}

impl From<PullSource> for String {
    fn from(value: PullSource) -> Self {
        match value {
            PullSource::Any => "any".to_string(),
            PullSource::Client(id) => id,
        }
    }
}

/// Messages from a client to the coordinator.
///
/// All transport events are scoped to the sender's registered group;
/// events from unregistered senders are dropped at the connection layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join a group, creating it if absent.
    Register {
        #[serde(rename = "groupID")]
        group_id: GroupId,
    },
    /// Claim authority: the sender started playing `filename` at `time`.
    Play { filename: TrackId, time: f64 },
    /// Release the playing flag but keep authority for a later resume.
    Pause {
        time: f64,
        /// Browser clients send the element label along; not needed for
        /// the state transition.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<TrackId>,
    },
    /// Advance the shared position. Honored only from the active client.
    Seeked {
        time: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<TrackId>,
    },
    /// Unconditional handoff of authority (and state) to a target peer.
    TransferRequest {
        #[serde(rename = "targetClientID")]
        target_client_id: ClientId,
        state: TransferState,
    },
    /// Ask a peer to report its live state back via a transfer request.
    PullRequest {
        #[serde(rename = "sourceClientID", with = "pull_source_string")]
        source_client_id: PullSource,
    },
}

/// Messages from the coordinator to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Registration accepted; carries the server-assigned client id.
    Registered {
        #[serde(rename = "clientID")]
        client_id: ClientId,
    },
    /// Current roster of the sender's group.
    ClientList { clients: Vec<ClientId> },
    /// A fresh authoritative snapshot after exactly one mutation.
    GlobalState { state: GroupState },
    /// Track identifiers available from the server's media library.
    FilesList { files: Vec<TrackId> },
    /// A peer wants to adopt this client's playback; reply with a
    /// `transferRequest` targeting the requesting client.
    RequestCurrentState {
        #[serde(rename = "requestingClientID")]
        requesting_client_id: ClientId,
    },
}

impl ServerMessage {
    /// Serializes to the JSON wire form. Serialization of these closed
    /// enums cannot fail in practice; a failure is logged and dropped,
    /// matching the fire-and-forget delivery model.
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(s) => Some(s),
            Err(e) => {
                log::error!("[Protocol] Failed to serialize server message: {}", e);
                None
            }
        }
    }
}

impl ClientMessage {
    /// Serializes to the JSON wire form.
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(s) => Some(s),
            Err(e) => {
                log::error!("[Protocol] Failed to serialize client message: {}", e);
                None
            }
        }
    }
}

/// Serde adapter mapping `PullSource` through its wire string form.
mod pull_source_string {
    use super::PullSource;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &PullSource, serializer: S) -> Result<S::Ok, S::Error> {
        String::from(value.clone()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PullSource, D::Error> {
        Ok(PullSource::from(String::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_uses_original_field_names() {
        let msg = ClientMessage::Register {
            group_id: "g1".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["groupID"], "g1");
    }

    #[test]
    fn group_state_round_trips_with_wire_names() {
        let state = GroupState {
            is_playing: true,
            current_track: Some("song.mp3".into()),
            current_time: 12.5,
            active_client_id: Some("c1".into()),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["isPlaying"], true);
        assert_eq!(json["currentTrack"], "song.mp3");
        assert_eq!(json["currentTime"], 12.5);
        assert_eq!(json["activeClientID"], "c1");

        let back: GroupState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn pull_source_any_is_the_literal_string() {
        let msg = ClientMessage::PullRequest {
            source_client_id: PullSource::Any,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sourceClientID"], "any");

        let back: ClientMessage = serde_json::from_value(json).unwrap();
        assert_eq!(
            back,
            ClientMessage::PullRequest {
                source_client_id: PullSource::Any
            }
        );
    }

    #[test]
    fn pull_source_concrete_id_round_trips() {
        let back: ClientMessage =
            serde_json::from_str(r#"{"type":"pullRequest","sourceClientID":"abc-123"}"#).unwrap();
        assert_eq!(
            back,
            ClientMessage::PullRequest {
                source_client_id: PullSource::Client("abc-123".into())
            }
        );
    }

    #[test]
    fn pause_tolerates_browser_filename_field() {
        let back: ClientMessage =
            serde_json::from_str(r#"{"type":"pause","time":3.0,"filename":"a.mp3"}"#).unwrap();
        assert_eq!(
            back,
            ClientMessage::Pause {
                time: 3.0,
                filename: Some("a.mp3".into())
            }
        );
    }

    #[test]
    fn unknown_message_type_is_a_parse_error() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"nuke","time":1}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"play"}"#).is_err());
    }

    #[test]
    fn playing_implies_active_catches_violations() {
        let mut state = GroupState::default();
        assert!(state.playing_implies_active());
        state.is_playing = true;
        assert!(!state.playing_implies_active());
        state.active_client_id = Some("c1".into());
        assert!(state.playing_implies_active());
    }
}
