use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use tagrush_core::lobby::{LevelRef, is_valid_lobby_code};
use tagrush_core::net::messages::{ChatRelayMsg, ClientMessage, LobbyErrorMsg, ServerMessage};
use tagrush_core::net::protocol::{
    MAX_MESSAGE_SIZE, decode_client_message, encode_server_message,
};
use tagrush_core::player::ConnId;

use crate::error::LobbyError;
use crate::lobby_manager::ClientSender;
use crate::state::{AppState, ConnectionGuard};

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<axum::response::Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let conn = state.alloc_conn_id();
    tracing::info!(conn, "Client connected");

    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    spawn_writer(ws_sender, rx);

    read_loop(&mut ws_receiver, &state, conn, &tx).await;

    // Transport closed: identical handling to an explicit leave_game.
    let mut lobbies = state.lobbies.write().await;
    lobbies.leave(conn);
    drop(lobbies);
    tracing::info!(conn, "Client disconnected");
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
    });
}

/// Per-connection rate limiter (token bucket).
struct RateLimiter {
    tokens: f64,
    last_refill: tokio::time::Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: tokio::time::Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns true if the message is allowed; false if rate-limited.
    fn allow(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    conn: ConnId,
    tx: &ClientSender,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = RateLimiter::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        if !rate_limiter.allow() {
            tracing::warn!(conn, "Rate limited");
            continue;
        }

        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        let client_msg = match decode_client_message(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(conn, error = %e, "Dropping undecodable frame");
                continue;
            },
        };

        dispatch(state, conn, tx, client_msg).await;
    }
}

/// Map one inbound event onto the lobby manager and fan the result out.
async fn dispatch(state: &AppState, conn: ConnId, tx: &ClientSender, msg: ClientMessage) {
    match msg {
        ClientMessage::CreateLobby(m) => {
            let Some(username) = state.identity.resolve(&m.username) else {
                send_error(tx, LobbyError::InvalidName);
                return;
            };
            let mut lobbies = state.lobbies.write().await;
            if lobbies.lobby_of_conn(conn).is_some() {
                tracing::warn!(conn, "create_lobby while already in a lobby");
                return;
            }
            let code = lobbies.create_lobby(conn, username, tx.clone());
            lobbies.broadcast_lobby_state(&code);
        },

        ClientMessage::JoinLobby(m) => {
            let Some(username) = state.identity.resolve(&m.username) else {
                send_error(tx, LobbyError::InvalidName);
                return;
            };
            if !is_valid_lobby_code(&m.code) {
                send_error(tx, LobbyError::NotFound);
                return;
            }
            let mut lobbies = state.lobbies.write().await;
            if lobbies.lobby_of_conn(conn).is_some() {
                tracing::warn!(conn, "join_lobby while already in a lobby");
                return;
            }
            match lobbies.join_lobby(&m.code, conn, username, tx.clone()) {
                Ok(()) => lobbies.broadcast_lobby_state(&m.code),
                Err(e) => {
                    drop(lobbies);
                    send_error(tx, e);
                },
            }
        },

        ClientMessage::SelectLevel(m) => {
            let mut lobbies = state.lobbies.write().await;
            let level = LevelRef {
                id: m.level_id,
                name: m.level_name,
            };
            match lobbies.select_level(&m.code, conn, level) {
                Ok(()) => lobbies.broadcast_lobby_state(&m.code),
                Err(e) => tracing::warn!(conn, lobby = %m.code, error = %e, "select_level rejected"),
            }
        },

        ClientMessage::SelectColor(m) => {
            let mut lobbies = state.lobbies.write().await;
            match lobbies.select_color(&m.code, conn, m.color) {
                Ok(()) => lobbies.broadcast_lobby_state(&m.code),
                Err(e) => tracing::warn!(conn, lobby = %m.code, error = %e, "select_color rejected"),
            }
        },

        ClientMessage::ToggleReady(m) => {
            let mut lobbies = state.lobbies.write().await;
            match lobbies.toggle_ready(&m.code, conn) {
                Ok(()) => lobbies.broadcast_lobby_state(&m.code),
                Err(e) => tracing::warn!(conn, lobby = %m.code, error = %e, "toggle_ready rejected"),
            }
        },

        ClientMessage::ChatMessage(m) => {
            if m.message.is_empty() || m.message.len() > 1024 {
                return;
            }
            if m.message.chars().any(|c| c.is_control() && c != '\n') {
                return;
            }
            let lobbies = state.lobbies.read().await;
            // Only members relay into a lobby's channel.
            let Some(username) = lobbies.username_of(&m.code, conn) else {
                return;
            };
            let relay = ServerMessage::ChatRelay(ChatRelayMsg {
                id: Uuid::new_v4().to_string(),
                username,
                text: m.message,
            });
            if let Ok(data) = encode_server_message(&relay) {
                lobbies.broadcast_to_lobby(&m.code, &data);
            }
        },

        ClientMessage::StartGame(m) => {
            let mut lobbies = state.lobbies.write().await;
            let result = lobbies.start_match(
                &m.code,
                conn,
                state.levels.as_ref(),
                &state.config.match_config,
                Arc::clone(&state.lobbies),
            );
            if let Err(e) = result {
                // Start failures are observable no-ops.
                tracing::warn!(conn, lobby = %m.code, error = %e, "start_game rejected");
            }
        },

        ClientMessage::PlayerInput(m) => {
            let lobbies = state.lobbies.read().await;
            lobbies.route_input(&m.code, conn, m.key, m.pressed);
        },

        ClientMessage::LeaveGame(_) => {
            let mut lobbies = state.lobbies.write().await;
            lobbies.leave(conn);
        },
    }
}

fn send_error(tx: &ClientSender, err: LobbyError) {
    let msg = ServerMessage::LobbyError(LobbyErrorMsg {
        message: err.to_string(),
    });
    if let Ok(data) = encode_server_message(&msg)
        && tx.try_send(Bytes::from(data)).is_err()
    {
        tracing::debug!("Failed to queue lobby_error for client");
    }
}
