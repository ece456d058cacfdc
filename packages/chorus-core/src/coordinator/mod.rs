//! Group coordination: the authoritative server side of the protocol.
//!
//! Each group is owned by a single actor task ([`group::GroupActor`])
//! that serializes every mutation of that group's state and roster.
//! [`GroupRegistry`] maps group ids to live actor handles and is the only
//! entry point for delivering commands; distinct groups run fully in
//! parallel.

mod group;

pub use group::{GroupCommand, GroupSnapshot};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::GroupId;

/// Handle to a live group actor.
struct GroupHandle {
    /// Identity of the owning actor, used to guard stale-entry removal.
    actor_id: u64,
    tx: mpsc::UnboundedSender<GroupCommand>,
}

/// Registry of live groups.
///
/// Groups are created implicitly by the first join and destroyed when the
/// actor observes an empty roster. A join racing a teardown is retried
/// against a fresh actor, so registration never gets lost.
pub struct GroupRegistry {
    groups: DashMap<GroupId, GroupHandle>,
    next_actor_id: AtomicU64,
}

impl GroupRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            groups: DashMap::new(),
            next_actor_id: AtomicU64::new(1),
        })
    }

    /// Delivers a join command, creating the group actor if absent.
    ///
    /// Retries if the command lands on an actor that is tearing down.
    pub fn join(self: &Arc<Self>, group_id: &str, mut cmd: GroupCommand) {
        debug_assert!(matches!(&cmd, GroupCommand::Join { .. }));
        loop {
            let (actor_id, tx) = {
                let handle = self
                    .groups
                    .entry(group_id.to_string())
                    .or_insert_with(|| self.spawn_group(group_id));
                (handle.actor_id, handle.tx.clone())
            };

            match tx.send(cmd) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    // Actor closed between lookup and send; drop the stale
                    // entry and retry against a fresh one.
                    self.retire(group_id, actor_id);
                    cmd = returned;
                }
            }
        }
    }

    /// Delivers a command to an existing group.
    ///
    /// Returns `false` if the group has no live actor; transport events
    /// for dead groups are dropped, matching fire-and-forget semantics.
    pub fn send(&self, group_id: &str, cmd: GroupCommand) -> bool {
        let Some(handle) = self.groups.get(group_id) else {
            return false;
        };
        let actor_id = handle.actor_id;
        let tx = handle.tx.clone();
        drop(handle);

        if tx.send(cmd).is_err() {
            self.retire(group_id, actor_id);
            return false;
        }
        true
    }

    /// Number of live groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Collects diagnostic snapshots from every live group.
    pub async fn snapshots(&self) -> Vec<GroupSnapshot> {
        let receivers: Vec<oneshot::Receiver<GroupSnapshot>> = self
            .groups
            .iter()
            .filter_map(|entry| {
                let (reply, rx) = oneshot::channel();
                entry
                    .value()
                    .tx
                    .send(GroupCommand::Snapshot { reply })
                    .ok()
                    .map(|()| rx)
            })
            .collect();

        let mut snapshots = Vec::with_capacity(receivers.len());
        for rx in receivers {
            // A group tearing down mid-collection simply drops its reply.
            if let Ok(snapshot) = rx.await {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        snapshots
    }

    /// Collects a diagnostic snapshot from one group.
    ///
    /// Returns `None` when the group has no live actor.
    pub async fn snapshot(&self, group_id: &str) -> Option<GroupSnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.send(group_id, GroupCommand::Snapshot { reply }) {
            return None;
        }
        rx.await.ok()
    }

    /// Spawns a fresh actor for `group_id` and returns its handle.
    fn spawn_group(self: &Arc<Self>, group_id: &str) -> GroupHandle {
        let actor_id = self.next_actor_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = group::GroupActor::new(group_id.to_string(), actor_id, rx, Arc::clone(self));

        log::info!("[Registry] Group created: {} (actor {})", group_id, actor_id);
        tokio::spawn(actor.run());

        GroupHandle { actor_id, tx }
    }

    /// Removes the registry entry, but only if it still belongs to the
    /// given actor - a newer actor for the same id must not be evicted.
    fn retire(&self, group_id: &str, actor_id: u64) {
        let removed = self
            .groups
            .remove_if(group_id, |_, handle| handle.actor_id == actor_id);
        if removed.is_some() {
            log::info!(
                "[Registry] Group destroyed: {} (remaining: {})",
                group_id,
                self.groups.len()
            );
        }
    }
}
