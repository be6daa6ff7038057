use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tagrush_core::net::messages::{
    CountdownMsg, GameStartedMsg, GameStateUpdateMsg, InputKey, ServerMessage,
};
use tagrush_core::net::protocol::encode_server_message;
use tagrush_core::player::ConnId;
use tagrush_game::{MatchOutcome, MatchSim};

use crate::lobby_manager::ClientSender;
use crate::state::SharedLobbyManager;

/// Commands sent from the dispatcher into a running match task.
#[derive(Debug)]
pub enum MatchCommand {
    Input {
        conn: ConnId,
        key: InputKey,
        pressed: bool,
    },
    Abort,
}

/// Broadcasts sent from a match task toward the lobby's clients.
#[derive(Debug)]
pub enum MatchBroadcast {
    /// Encoded ServerMessage bytes ready for the wire.
    Encoded(Bytes),
    /// The match reached a terminal outcome.
    Finished(MatchOutcome),
}

/// Static parameters for one spawned match session.
pub struct MatchSessionConfig {
    pub code: String,
    pub countdown_from: u8,
    pub tick_rate_hz: u32,
}

/// Spawn the authoritative tick loop for one lobby.
/// Returns the command sender, the broadcast receiver, and the task handle.
pub fn spawn_match_session(
    sim: MatchSim,
    cfg: MatchSessionConfig,
) -> (
    mpsc::UnboundedSender<MatchCommand>,
    mpsc::UnboundedReceiver<MatchBroadcast>,
    JoinHandle<()>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        run_match_loop(sim, cfg, cmd_rx, broadcast_tx).await;
    });
    (cmd_tx, broadcast_rx, handle)
}

/// The per-lobby session driver: initial snapshot, descending countdown,
/// then the fixed-rate tick schedule until a terminal outcome or an abort.
async fn run_match_loop(
    mut sim: MatchSim,
    cfg: MatchSessionConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<MatchCommand>,
    broadcast_tx: mpsc::UnboundedSender<MatchBroadcast>,
) {
    send_encoded(
        &broadcast_tx,
        &ServerMessage::GameStarted(GameStartedMsg {
            snapshot: sim.snapshot(),
        }),
        &cfg.code,
    );

    // Countdown: one value per second, then one more beat before the clock
    // starts. Inputs arriving now are dropped; only Abort matters.
    let mut remaining = cfg.countdown_from;
    let mut beat = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = beat.tick() => {
                if remaining == 0 {
                    break;
                }
                send_encoded(
                    &broadcast_tx,
                    &ServerMessage::Countdown(CountdownMsg { value: remaining }),
                    &cfg.code,
                );
                remaining -= 1;
            }
            cmd = cmd_rx.recv() => {
                if matches!(cmd, None | Some(MatchCommand::Abort)) {
                    return;
                }
            }
        }
    }

    sim.activate(Instant::now());

    let tick_interval = Duration::from_secs_f64(1.0 / f64::from(cfg.tick_rate_hz));
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = sim.tick(Instant::now());
                send_encoded(
                    &broadcast_tx,
                    &ServerMessage::GameStateUpdate(GameStateUpdateMsg {
                        tick: sim.tick_count(),
                        snapshot: sim.snapshot(),
                    }),
                    &cfg.code,
                );
                if let Some(outcome) = outcome {
                    let _ = broadcast_tx.send(MatchBroadcast::Finished(outcome));
                    return;
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(MatchCommand::Input { conn, key, pressed }) => {
                        sim.apply_input(conn, key, pressed);
                    },
                    Some(MatchCommand::Abort) | None => return,
                }
            }
        }
    }
}

fn send_encoded(
    tx: &mpsc::UnboundedSender<MatchBroadcast>,
    msg: &ServerMessage,
    code: &str,
) {
    match encode_server_message(msg) {
        Ok(data) => {
            let _ = tx.send(MatchBroadcast::Encoded(Bytes::from(data)));
        },
        Err(e) => tracing::error!(lobby = code, error = %e, "Failed to encode match broadcast"),
    }
}

/// Forward match broadcasts to the lobby's clients, then apply terminal
/// effects under the manager lock. The sender set is frozen at start time:
/// any membership change while Started tears the whole lobby down anyway.
pub async fn forward_broadcasts(
    mut rx: mpsc::UnboundedReceiver<MatchBroadcast>,
    senders: HashMap<ConnId, ClientSender>,
    manager: SharedLobbyManager,
    code: String,
    level_name: String,
) {
    while let Some(broadcast) = rx.recv().await {
        match broadcast {
            MatchBroadcast::Encoded(data) => {
                for (&conn, sender) in &senders {
                    if sender.try_send(data.clone()).is_err() {
                        tracing::debug!(conn, lobby = %code, "Skipping broadcast to slow client");
                    }
                }
            },
            MatchBroadcast::Finished(outcome) => {
                let mut mgr = manager.write().await;
                mgr.finish_match(&code, &outcome, &level_name);
                break;
            },
        }
    }
}
