//! WebSocket handler bridging client messages into the group actors.
//!
//! One socket carries one client identity, assigned at its first
//! `register`. The handler parses inbound JSON into [`ClientMessage`]s,
//! maps them onto [`GroupCommand`]s, and pumps the actor's outbound
//! channel back into the socket. Actors never touch sockets directly.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::AppState;
use crate::coordinator::GroupCommand;
use crate::protocol::{ClientId, ClientMessage, GroupId, ServerMessage};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main WebSocket connection handler.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register connection for tracking and force-close capability
    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    // One identity per socket, minted up front and announced in the
    // `registered` reply once the client joins a group.
    let client_id: ClientId = Uuid::new_v4().to_string();
    let mut membership: Option<GroupId> = None;

    // Group actors deliver through this funnel; only this task touches
    // the socket sink, so per-client ordering is the channel's ordering.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    log::info!(
        "[WS] New connection established: {} (client {})",
        conn_guard.id(),
        client_id
    );

    loop {
        tokio::select! {
            // Handle force-close request
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_guard.id());
                break;
            }
            // Handle incoming messages from the client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(
                            &state,
                            conn_guard.id(),
                            &client_id,
                            &mut membership,
                            &out_tx,
                            &text,
                        )
                        .await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            // Forward coordinator messages out to the client
            out = out_rx.recv() => {
                // recv() cannot return None while out_tx lives above.
                let Some(server_msg) = out else { break };
                let Some(json) = server_msg.to_json() else { continue };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Departure is part of the group's command stream, so peers see the
    // roster and state updates in order.
    if let Some(group_id) = membership.take() {
        state.groups.send(
            &group_id,
            GroupCommand::Leave {
                client_id: client_id.clone(),
            },
        );
        log::info!("[WS] Client {} left group {}", client_id, group_id);
    }

    // ConnectionGuard Drop impl handles manager cleanup
}

/// Parses one inbound text frame and routes it.
///
/// Unknown or malformed frames are dropped here; the connection stays
/// up and later frames are unaffected.
async fn handle_text(
    state: &AppState,
    conn_id: &str,
    client_id: &ClientId,
    membership: &mut Option<GroupId>,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    text: &str,
) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(parsed) => {
            dispatch(state, conn_id, client_id, membership, out_tx, parsed).await;
        }
        Err(e) => {
            log::debug!("[WS] Unparseable message from {}: {}", client_id, e);
        }
    }
}

/// Maps one parsed client message onto the owning group's actor.
async fn dispatch(
    state: &AppState,
    conn_id: &str,
    client_id: &ClientId,
    membership: &mut Option<GroupId>,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    msg: ClientMessage,
) {
    if let ClientMessage::Register { group_id } = msg {
        register(state, conn_id, client_id, membership, out_tx, group_id).await;
        return;
    }

    // Everything else requires a prior register on this socket.
    let Some(group_id) = membership.as_deref() else {
        log::debug!("[WS] Dropping pre-register event from connection {}", conn_id);
        return;
    };

    let cmd = match msg {
        // Register is handled above.
        ClientMessage::Register { .. } => return,
        ClientMessage::Play { filename, time } => GroupCommand::Play {
            sender: client_id.clone(),
            filename,
            time,
        },
        ClientMessage::Pause { time, .. } => GroupCommand::Pause {
            sender: client_id.clone(),
            time,
        },
        ClientMessage::Seeked { time, .. } => GroupCommand::Seeked {
            sender: client_id.clone(),
            time,
        },
        ClientMessage::TransferRequest {
            target_client_id,
            state: transfer,
        } => GroupCommand::Transfer {
            sender: client_id.clone(),
            target: target_client_id,
            state: transfer,
        },
        ClientMessage::PullRequest { source_client_id } => GroupCommand::Pull {
            sender: client_id.clone(),
            source: source_client_id,
        },
    };

    if !state.groups.send(group_id, cmd) {
        // The actor retired between our join and this event; the
        // membership is stale and the client must re-register.
        log::warn!(
            "[WS] Group {} gone, dropping event from {}",
            group_id,
            client_id
        );
    }
}

/// Handles `register`, including re-registration to another group.
async fn register(
    state: &AppState,
    conn_id: &str,
    client_id: &ClientId,
    membership: &mut Option<GroupId>,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    group_id: GroupId,
) {
    // Moving between groups: leave the old one first so its roster
    // broadcast goes out before the new group's.
    if let Some(previous) = membership.take() {
        if previous != group_id {
            state.groups.send(
                &previous,
                GroupCommand::Leave {
                    client_id: client_id.clone(),
                },
            );
            log::info!(
                "[WS] Client {} moving from group {} to {}",
                client_id,
                previous,
                group_id
            );
        }
    }

    // Scan the library at join time so the files list reflects disk;
    // an unreadable media directory degrades to an empty list.
    let files = match state.library.list().await {
        Ok(files) => files,
        Err(e) => {
            log::warn!("[WS] Library scan failed: {}", e);
            Vec::new()
        }
    };

    state.groups.join(
        &group_id,
        GroupCommand::Join {
            client_id: client_id.clone(),
            outbound: out_tx.clone(),
            files,
        },
    );

    state
        .ws_manager
        .note_registration(conn_id, client_id, &group_id);
    *membership = Some(group_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use crate::config::Config;

    fn test_state(media_dir: &std::path::Path) -> AppState {
        AppState::new(Config {
            preferred_port: 0,
            media_dir: media_dir.to_path_buf(),
        })
    }

    async fn recv(rx: &mut UnboundedReceiver<ServerMessage>) -> ServerMessage {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for server message")
            .expect("outbound channel closed")
    }

    /// Consumes the four-message join reply (registered, clientList,
    /// globalState, filesList).
    async fn drain_join_reply(rx: &mut UnboundedReceiver<ServerMessage>) {
        for _ in 0..4 {
            let _ = recv(rx).await;
        }
    }

    async fn expect_roster(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ClientId> {
        match recv(rx).await {
            ServerMessage::ClientList { clients } => clients,
            other => panic!("expected clientList, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn re_register_leaves_the_old_group_before_joining_the_new() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        // A peer sits in g1 to observe its roster broadcasts.
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
        state.groups.join(
            "g1",
            GroupCommand::Join {
                client_id: "peer".into(),
                outbound: peer_tx,
                files: Vec::new(),
            },
        );
        drain_join_reply(&mut peer_rx).await;

        let conn = state.ws_manager.register();
        let client_id: ClientId = "mover".into();
        let mut membership = None;
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        handle_text(
            &state,
            conn.id(),
            &client_id,
            &mut membership,
            &out_tx,
            r#"{"type":"register","groupID":"g1"}"#,
        )
        .await;
        assert_eq!(membership.as_deref(), Some("g1"));
        drain_join_reply(&mut out_rx).await;
        assert_eq!(
            expect_roster(&mut peer_rx).await,
            vec!["mover".to_string(), "peer".to_string()]
        );

        handle_text(
            &state,
            conn.id(),
            &client_id,
            &mut membership,
            &out_tx,
            r#"{"type":"register","groupID":"g2"}"#,
        )
        .await;
        assert_eq!(membership.as_deref(), Some("g2"));

        // The old group's roster shrinks back to the peer alone...
        assert_eq!(expect_roster(&mut peer_rx).await, vec!["peer".to_string()]);
        // ...and the mover's next reply is the fresh registration in g2.
        assert_eq!(
            recv(&mut out_rx).await,
            ServerMessage::Registered {
                client_id: "mover".into()
            }
        );
        let ServerMessage::ClientList { clients } = recv(&mut out_rx).await else {
            panic!("expected roster after register");
        };
        assert_eq!(clients, vec!["mover".to_string()]);

        let snapshots = state.groups.snapshots().await;
        let g1 = snapshots.iter().find(|s| s.group_id == "g1").unwrap();
        let g2 = snapshots.iter().find(|s| s.group_id == "g2").unwrap();
        assert_eq!(g1.clients, vec!["peer".to_string()]);
        assert_eq!(g2.clients, vec!["mover".to_string()]);
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_and_later_frames_still_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let conn = state.ws_manager.register();
        let client_id: ClientId = "c1".into();
        let mut membership = None;
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        // Not JSON, then JSON with an unknown type tag.
        handle_text(
            &state,
            conn.id(),
            &client_id,
            &mut membership,
            &out_tx,
            "{definitely not json",
        )
        .await;
        handle_text(
            &state,
            conn.id(),
            &client_id,
            &mut membership,
            &out_tx,
            r#"{"type":"selfDestruct","time":0}"#,
        )
        .await;

        assert!(membership.is_none());
        assert_eq!(state.groups.group_count(), 0);

        // The connection is still serviceable: a valid register lands.
        handle_text(
            &state,
            conn.id(),
            &client_id,
            &mut membership,
            &out_tx,
            r#"{"type":"register","groupID":"g1"}"#,
        )
        .await;
        assert_eq!(membership.as_deref(), Some("g1"));
        assert_eq!(
            recv(&mut out_rx).await,
            ServerMessage::Registered {
                client_id: "c1".into()
            }
        );
    }

    #[tokio::test]
    async fn transport_events_before_register_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let conn = state.ws_manager.register();
        let client_id: ClientId = "c1".into();
        let mut membership = None;
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        handle_text(
            &state,
            conn.id(),
            &client_id,
            &mut membership,
            &out_tx,
            r#"{"type":"play","filename":"song.mp3","time":0}"#,
        )
        .await;

        assert!(membership.is_none());
        assert_eq!(state.groups.group_count(), 0);
        assert!(out_rx.try_recv().is_err());
    }
}
