//! Chorus Player - headless command-line playback client.
//!
//! Connects to a Chorus server, registers into a group, and drives a
//! simulated multi-track deck from terminal commands. Useful for
//! observing synchronization behavior without a browser client, and as
//! a reference for wiring [`ReconcilerEngine`] to a real device.

mod deck;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::Message;

use chorus_core::{
    ClientMessage, PlaybackDevice, PullSource, ReconcilerEngine, ServerMessage, TrackId,
};

use crate::deck::LogDeck;

/// Chorus Player - terminal client for group playback synchronization.
#[derive(Parser, Debug)]
#[command(name = "chorus-player")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket endpoint of the coordinator.
    #[arg(
        short,
        long,
        default_value = "ws://127.0.0.1:8080/ws",
        env = "CHORUS_SERVER_URL"
    )]
    server: String,

    /// Group to register into.
    #[arg(short, long, default_value = "living-room", env = "CHORUS_GROUP")]
    group: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CHORUS_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Chorus Player v{}", env!("CARGO_PKG_VERSION"));

    let (ws_stream, _) = tokio_tungstenite::connect_async(&args.server)
        .await
        .with_context(|| format!("Failed to connect to {}", args.server))?;
    log::info!("Connected to {}", args.server);
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let deck = Arc::new(LogDeck::new());
    let mut engine = ReconcilerEngine::new(deck.clone());

    let register = ClientMessage::Register {
        group_id: args.group.clone(),
    };
    if let Some(json) = register.to_json() {
        ws_tx.send(Message::Text(json.into())).await?;
    }
    log::info!("Registering into group '{}'", args.group);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    println!("Commands: play <track> [time] | pause | seek <time> | pull [client] | transfer <client> | tracks | who | quit");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_server_message(&mut engine, &deck, &mut ws_tx, &text).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::warn!("Server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong handled by the transport
                    Some(Err(e)) => {
                        log::error!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
            line = stdin.next_line() => {
                let Ok(Some(line)) = line else { break };
                match run_command(&mut engine, &deck, line.trim()).await {
                    CommandResult::Send(msg) => {
                        if let Some(json) = msg.to_json() {
                            ws_tx.send(Message::Text(json.into())).await?;
                        }
                    }
                    CommandResult::Quit => break,
                    CommandResult::Nothing => {}
                }
            }
        }
    }

    Ok(())
}

/// Applies one coordinator message to the engine and deck.
async fn handle_server_message<S>(
    engine: &mut ReconcilerEngine,
    deck: &LogDeck,
    ws_tx: &mut S,
    text: &str,
) -> Result<()>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let parsed = match serde_json::from_str::<ServerMessage>(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("Unparseable server message: {}", e);
            return Ok(());
        }
    };

    match parsed {
        ServerMessage::Registered { client_id } => {
            engine.on_registered(client_id);
        }
        ServerMessage::ClientList { clients } => {
            engine.on_client_list(clients);
            print_roster(engine);
        }
        ServerMessage::GlobalState { state } => {
            let outcome = engine.apply_authoritative(state, Instant::now()).await;
            log::debug!("Applied authoritative state: {:?}", outcome);
        }
        ServerMessage::FilesList { files } => {
            deck.load_tracks(files);
        }
        ServerMessage::RequestCurrentState {
            requesting_client_id,
        } => {
            if let Some(reply) = engine.on_request_current_state(requesting_client_id).await {
                if let Some(json) = reply.to_json() {
                    ws_tx.send(Message::Text(json.into())).await?;
                }
            }
        }
    }
    Ok(())
}

enum CommandResult {
    Send(ClientMessage),
    Nothing,
    Quit,
}

/// Parses and executes one terminal command.
async fn run_command(
    engine: &mut ReconcilerEngine,
    deck: &LogDeck,
    line: &str,
) -> CommandResult {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("play") => {
            let Some(track) = parts.next() else {
                println!("usage: play <track> [time]");
                return CommandResult::Nothing;
            };
            let track: TrackId = track.to_string();
            let time = parts
                .next()
                .and_then(|t| t.parse().ok())
                .or_else(|| deck.position(&track))
                .unwrap_or(0.0);

            if deck.seek(&track, time).await.is_err() || deck.play(&track).await.is_err() {
                println!("no such track: {}", track);
                return CommandResult::Nothing;
            }
            match engine.local_play(track, time, Instant::now()).await {
                Some(msg) => CommandResult::Send(msg),
                None => CommandResult::Nothing,
            }
        }
        Some("pause") => {
            let Some(track) = engine.mirror().current_track.clone() else {
                println!("nothing to pause");
                return CommandResult::Nothing;
            };
            let _ = deck.pause(&track).await;
            let time = deck.position(&track).unwrap_or(0.0);
            match engine.local_pause(time, Instant::now()) {
                Some(msg) => CommandResult::Send(msg),
                None => CommandResult::Nothing,
            }
        }
        Some("seek") => {
            let Some(time) = parts.next().and_then(|t| t.parse::<f64>().ok()) else {
                println!("usage: seek <seconds>");
                return CommandResult::Nothing;
            };
            if let Some(track) = engine.mirror().current_track.clone() {
                let _ = deck.seek(&track, time).await;
            }
            match engine.local_seeked(time, Instant::now()) {
                Some(msg) => CommandResult::Send(msg),
                None => CommandResult::Nothing,
            }
        }
        Some("pull") => match parts.next() {
            Some(client) => CommandResult::Send(ClientMessage::PullRequest {
                source_client_id: PullSource::Client(client.to_string()),
            }),
            None => CommandResult::Send(engine.pull_from_playing()),
        },
        Some("transfer") => {
            let Some(client) = parts.next() else {
                println!("usage: transfer <client>");
                return CommandResult::Nothing;
            };
            match engine.transfer_to(client.to_string()).await {
                Some(msg) => CommandResult::Send(msg),
                None => {
                    println!("nothing is playing here to transfer");
                    CommandResult::Nothing
                }
            }
        }
        Some("tracks") => {
            for track in deck.track_ids() {
                println!("  {}", track);
            }
            CommandResult::Nothing
        }
        Some("who") => {
            print_roster(engine);
            CommandResult::Nothing
        }
        Some("quit") | Some("exit") => CommandResult::Quit,
        Some(_) => {
            println!("unknown command");
            CommandResult::Nothing
        }
        None => CommandResult::Nothing,
    }
}

fn print_roster(engine: &ReconcilerEngine) {
    println!("group members:");
    for entry in engine.roster() {
        let marker = if entry.is_self { "*" } else { " " };
        match (&entry.now_playing, entry.is_active) {
            (Some(track), _) => println!("  {} {} (playing {})", marker, entry.client_id, track),
            (None, true) => println!("  {} {} (active)", marker, entry.client_id),
            (None, false) => println!("  {} {}", marker, entry.client_id),
        }
    }
}
