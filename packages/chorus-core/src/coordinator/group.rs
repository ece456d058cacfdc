//! The per-group coordinator actor.
//!
//! Owns the authoritative [`GroupState`] and the roster of connected
//! clients. Commands arrive over a single mpsc channel, so read-modify-
//! write sequences never interleave within a group; concurrently
//! submitted events are applied in arrival order (last-write-wins).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{
    ClientId, GroupId, GroupState, PullSource, ServerMessage, TrackId, TransferState,
};

use super::GroupRegistry;

/// Commands addressed to one group's actor.
#[derive(Debug)]
pub enum GroupCommand {
    /// Add a client to the roster and reply with id, roster, state, tracks.
    Join {
        client_id: ClientId,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        files: Vec<TrackId>,
    },
    /// Remove a client (disconnect or re-register elsewhere).
    Leave { client_id: ClientId },
    /// Sender claims authority and starts playing.
    Play {
        sender: ClientId,
        filename: TrackId,
        time: f64,
    },
    /// Sender paused; keeps authority for a later resume.
    Pause { sender: ClientId, time: f64 },
    /// Sender moved the playback position.
    Seeked { sender: ClientId, time: f64 },
    /// Explicit handoff of state and authority to a target peer.
    Transfer {
        sender: ClientId,
        target: ClientId,
        state: TransferState,
    },
    /// Ask a peer to report its live state back to the sender.
    Pull { sender: ClientId, source: PullSource },
    /// Diagnostic snapshot of roster and state.
    Snapshot {
        reply: oneshot::Sender<GroupSnapshot>,
    },
}

/// Point-in-time view of a group, for the diagnostics API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshot {
    #[serde(rename = "groupID")]
    pub group_id: GroupId,
    pub clients: Vec<ClientId>,
    pub state: GroupState,
}

/// Single-task owner of one group's state and roster.
pub(super) struct GroupActor {
    group_id: GroupId,
    actor_id: u64,
    state: GroupState,
    /// BTreeMap keeps roster broadcasts in a stable order.
    roster: BTreeMap<ClientId, mpsc::UnboundedSender<ServerMessage>>,
    rx: mpsc::UnboundedReceiver<GroupCommand>,
    registry: Arc<GroupRegistry>,
}

impl GroupActor {
    pub(super) fn new(
        group_id: GroupId,
        actor_id: u64,
        rx: mpsc::UnboundedReceiver<GroupCommand>,
        registry: Arc<GroupRegistry>,
    ) -> Self {
        Self {
            group_id,
            actor_id,
            state: GroupState::default(),
            roster: BTreeMap::new(),
            rx,
            registry,
        }
    }

    /// Processes commands until the roster drains, then retires the group.
    pub(super) async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
            if self.roster.is_empty() {
                break;
            }
        }

        // Retire before draining: joins queued behind the teardown are
        // re-dispatched so a register racing the destruction still lands.
        self.registry.retire(&self.group_id, self.actor_id);
        self.rx.close();
        while let Some(cmd) = self.rx.recv().await {
            if let GroupCommand::Join { .. } = cmd {
                log::debug!(
                    "[Coordinator] {}: join raced teardown, re-dispatching",
                    self.group_id
                );
                self.registry.join(&self.group_id, cmd);
            }
        }

        debug_assert!(self.state.playing_implies_active());
    }

    fn handle(&mut self, cmd: GroupCommand) {
        match cmd {
            GroupCommand::Join {
                client_id,
                outbound,
                files,
            } => self.handle_join(client_id, outbound, files),
            GroupCommand::Leave { client_id } => self.handle_leave(client_id),
            GroupCommand::Play {
                sender,
                filename,
                time,
            } => self.handle_play(sender, filename, time),
            GroupCommand::Pause { sender, time } => self.handle_pause(sender, time),
            GroupCommand::Seeked { sender, time } => self.handle_seeked(sender, time),
            GroupCommand::Transfer {
                sender,
                target,
                state,
            } => self.handle_transfer(sender, target, state),
            GroupCommand::Pull { sender, source } => self.handle_pull(sender, source),
            GroupCommand::Snapshot { reply } => {
                let _ = reply.send(GroupSnapshot {
                    group_id: self.group_id.clone(),
                    clients: self.client_ids(),
                    state: self.state.clone(),
                });
            }
        }

        debug_assert!(
            self.state.playing_implies_active(),
            "group {}: playing without an active client",
            self.group_id
        );
    }

    fn handle_join(
        &mut self,
        client_id: ClientId,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        files: Vec<TrackId>,
    ) {
        let rejoined = self.roster.insert(client_id.clone(), outbound).is_some();

        self.send_to(
            &client_id,
            ServerMessage::Registered {
                client_id: client_id.clone(),
            },
        );
        self.send_to(
            &client_id,
            ServerMessage::ClientList {
                clients: self.client_ids(),
            },
        );
        self.send_to(
            &client_id,
            ServerMessage::GlobalState {
                state: self.state.clone(),
            },
        );
        self.send_to(&client_id, ServerMessage::FilesList { files });

        // Roster changed for everyone else.
        self.broadcast_roster_except(Some(&client_id));

        log::info!(
            "[Coordinator] {}: client {} {} (roster: {})",
            self.group_id,
            client_id,
            if rejoined { "re-registered" } else { "registered" },
            self.roster.len()
        );
    }

    fn handle_leave(&mut self, client_id: ClientId) {
        if self.roster.remove(&client_id).is_none() {
            return;
        }

        // Roster removal happens before any broadcast of this event.
        if self.state.active_client_id.as_deref() == Some(client_id.as_str()) {
            self.state.is_playing = false;
            self.state.active_client_id = None;
            log::info!(
                "[Coordinator] {}: active client {} left, playback released",
                self.group_id,
                client_id
            );
            self.broadcast_state();
        } else {
            log::info!(
                "[Coordinator] {}: client {} left (roster: {})",
                self.group_id,
                client_id,
                self.roster.len()
            );
        }

        self.broadcast_roster_except(None);
    }

    fn handle_play(&mut self, sender: ClientId, filename: TrackId, time: f64) {
        if !self.roster.contains_key(&sender) {
            return;
        }

        // Unknown filenames are accepted; they simply will not play
        // anywhere that lacks the track.
        self.state.is_playing = true;
        self.state.current_track = Some(filename);
        self.state.current_time = time;
        self.state.active_client_id = Some(sender);
        self.broadcast_state();
    }

    fn handle_pause(&mut self, sender: ClientId, time: f64) {
        if !self.roster.contains_key(&sender) {
            return;
        }

        // Authority is retained so the same client can resume.
        self.state.is_playing = false;
        self.state.current_time = time;
        self.broadcast_state();
    }

    fn handle_seeked(&mut self, sender: ClientId, time: f64) {
        // The primary consistency guard: only the active client may move
        // the shared position.
        if self.state.active_client_id.as_deref() != Some(sender.as_str()) {
            log::debug!(
                "[Coordinator] {}: dropping seek from non-active client {}",
                self.group_id,
                sender
            );
            return;
        }

        self.state.current_time = time;
        self.broadcast_state();
    }

    fn handle_transfer(&mut self, sender: ClientId, target: ClientId, state: TransferState) {
        if !self.roster.contains_key(&sender) {
            return;
        }
        if !self.roster.contains_key(&target) {
            log::debug!(
                "[Coordinator] {}: dropping transfer to unknown client {}",
                self.group_id,
                target
            );
            return;
        }

        // Trust-the-caller handoff: the target learns of its new authority
        // from the resulting broadcast.
        self.state = GroupState {
            is_playing: state.is_playing,
            current_track: Some(state.filename),
            current_time: state.time,
            active_client_id: Some(target.clone()),
        };
        log::info!(
            "[Coordinator] {}: authority handed from {} to {}",
            self.group_id,
            sender,
            target
        );
        self.broadcast_state();
    }

    fn handle_pull(&mut self, sender: ClientId, source: PullSource) {
        if !self.roster.contains_key(&sender) {
            return;
        }

        let asked = match source {
            // "any" resolves to the active client, and only while it is
            // actually playing.
            PullSource::Any => match (&self.state.active_client_id, self.state.is_playing) {
                (Some(active), true) => Some(active.clone()),
                _ => None,
            },
            // A concrete id is asked regardless of play state.
            PullSource::Client(id) => self.roster.contains_key(&id).then_some(id),
        };

        let Some(asked) = asked else {
            log::debug!(
                "[Coordinator] {}: pull from {} had no addressable source",
                self.group_id,
                sender
            );
            return;
        };

        self.send_to(
            &asked,
            ServerMessage::RequestCurrentState {
                requesting_client_id: sender,
            },
        );
    }

    fn client_ids(&self) -> Vec<ClientId> {
        self.roster.keys().cloned().collect()
    }

    fn send_to(&self, client_id: &str, msg: ServerMessage) {
        if let Some(outbound) = self.roster.get(client_id) {
            if outbound.send(msg).is_err() {
                // Connection already gone; its Leave is in flight.
                log::debug!(
                    "[Coordinator] {}: outbound channel closed for {}",
                    self.group_id,
                    client_id
                );
            }
        }
    }

    /// Broadcasts the current state to every member, sender included -
    /// each broadcast is one atomic snapshot after exactly one mutation.
    fn broadcast_state(&self) {
        for client_id in self.roster.keys() {
            self.send_to(
                client_id,
                ServerMessage::GlobalState {
                    state: self.state.clone(),
                },
            );
        }
    }

    fn broadcast_roster_except(&self, skip: Option<&str>) {
        let clients = self.client_ids();
        for client_id in self.roster.keys() {
            if Some(client_id.as_str()) == skip {
                continue;
            }
            self.send_to(
                client_id,
                ServerMessage::ClientList {
                    clients: clients.clone(),
                },
            );
        }
    }
}
