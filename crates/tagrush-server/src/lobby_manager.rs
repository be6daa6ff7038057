use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tagrush_core::level::LevelSource;
use tagrush_core::lobby::{LevelRef, Lobby, LobbyStatus, generate_lobby_code};
use tagrush_core::net::messages::{
    GameOverMsg, InputKey, LobbyClosedMsg, LobbyStateMsg, ServerMessage,
};
use tagrush_core::net::protocol::encode_server_message;
use tagrush_core::player::{ConnId, LobbyPlayer, PlayerColor};
use tagrush_game::{MatchOutcome, MatchSim};

use crate::config::MatchConfig;
use crate::error::LobbyError;
use crate::levels::resolve_level;
use crate::match_loop::{MatchCommand, MatchSessionConfig, spawn_match_session};
use crate::persist::MatchStore;
use crate::state::SharedLobbyManager;

/// Per-connection sender for outbound WebSocket binary frames.
/// Bounded so a slow client drops broadcasts instead of exhausting memory;
/// `Bytes` keeps broadcast clones cheap.
pub type ClientSender = mpsc::Sender<Bytes>;

/// Notice sent to the remaining players when a Started lobby is torn down.
const DISBAND_NOTICE: &str = "A player disconnected. The match has ended.";

struct LobbyEntry {
    lobby: Lobby,
    connections: HashMap<ConnId, ClientSender>,
    /// Channel into the running match task, present only while Started.
    match_command_tx: Option<mpsc::UnboundedSender<MatchCommand>>,
    match_task: Option<JoinHandle<()>>,
    forward_task: Option<JoinHandle<()>>,
}

/// Owns every live lobby: code allocation, membership, match task lifecycle,
/// and broadcast fan-out.
///
/// An owned instance with an injected store and RNG seed, so tests can run
/// any number of managers side by side.
pub struct LobbyManager {
    lobbies: HashMap<String, LobbyEntry>,
    /// Connection-to-lobby index; the only process-wide view besides the
    /// code map itself.
    by_conn: HashMap<ConnId, String>,
    store: Arc<dyn MatchStore>,
    rng: StdRng,
}

impl LobbyManager {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self {
            lobbies: HashMap::new(),
            by_conn: HashMap::new(),
            store,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic construction for tests.
    pub fn with_rng_seed(store: Arc<dyn MatchStore>, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(store)
        }
    }

    /// Draw codes until one is not held by a live lobby. Collisions are
    /// astronomically rare but the retry loop is what makes codes unique.
    fn alloc_code(&mut self) -> String {
        loop {
            let code = generate_lobby_code(&mut self.rng);
            if !self.lobbies.contains_key(&code) {
                return code;
            }
        }
    }

    /// Create a lobby with `conn` as host and sole player. Returns the code.
    pub fn create_lobby(&mut self, conn: ConnId, username: String, sender: ClientSender) -> String {
        let code = self.alloc_code();
        let lobby = Lobby::new(code.clone(), conn, username);
        if let Err(e) = self
            .store
            .create_match_record(&code, &lobby.players[0], &lobby.players)
        {
            tracing::warn!(lobby = %code, error = %e, "Store create failed");
        }
        let mut connections = HashMap::new();
        connections.insert(conn, sender);
        self.lobbies.insert(
            code.clone(),
            LobbyEntry {
                lobby,
                connections,
                match_command_tx: None,
                match_task: None,
                forward_task: None,
            },
        );
        self.by_conn.insert(conn, code.clone());
        tracing::info!(lobby = %code, conn, "Lobby created");
        code
    }

    /// Join an Open lobby, taking the first free palette color.
    pub fn join_lobby(
        &mut self,
        code: &str,
        conn: ConnId,
        username: String,
        sender: ClientSender,
    ) -> Result<(), LobbyError> {
        let entry = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if entry.lobby.status != LobbyStatus::Open {
            return Err(LobbyError::MatchInProgress);
        }
        if entry.lobby.is_full() {
            return Err(LobbyError::Full);
        }

        let player = LobbyPlayer {
            conn,
            username,
            ready: false,
            color: entry.lobby.first_free_color(),
        };
        if let Err(e) = self.store.append_player(code, &player) {
            tracing::warn!(lobby = code, error = %e, "Store append failed");
        }
        entry.lobby.players.push(player);
        entry.connections.insert(conn, sender);
        self.by_conn.insert(conn, code.to_string());
        tracing::info!(lobby = code, conn, "Player joined");
        Ok(())
    }

    /// Change the caller's color. Palette-only, and never a color another
    /// player holds; re-picking one's own color is a quiet success.
    pub fn select_color(
        &mut self,
        code: &str,
        conn: ConnId,
        color: PlayerColor,
    ) -> Result<(), LobbyError> {
        let entry = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if !color.in_palette() || entry.lobby.color_taken_by_other(conn, color) {
            return Err(LobbyError::InvalidColor);
        }
        let player = entry.lobby.player_mut(conn).ok_or(LobbyError::NotFound)?;
        if player.color != color {
            player.color = color;
            if let Err(e) = self.store.update_player_color(code, conn, color) {
                tracing::warn!(lobby = code, error = %e, "Store color update failed");
            }
        }
        Ok(())
    }

    /// Store the host's level selection for match start.
    pub fn select_level(
        &mut self,
        code: &str,
        conn: ConnId,
        level: LevelRef,
    ) -> Result<(), LobbyError> {
        let entry = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if !entry.lobby.is_host(conn) {
            return Err(LobbyError::NotHost);
        }
        entry.lobby.level = Some(level);
        Ok(())
    }

    /// Flip the caller's ready flag. Arriving after a finished match, this
    /// doubles as the play-again trigger: the lobby reopens first.
    pub fn toggle_ready(&mut self, code: &str, conn: ConnId) -> Result<(), LobbyError> {
        let entry = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if entry.lobby.status == LobbyStatus::Started {
            return Err(LobbyError::MatchInProgress);
        }
        if entry.lobby.status == LobbyStatus::MatchOver {
            entry.lobby.status = LobbyStatus::Open;
            entry.lobby.created_at = Instant::now();
            let host = entry.lobby.host;
            for p in &mut entry.lobby.players {
                p.ready = p.conn == host;
            }
            tracing::info!(lobby = code, "Lobby reopened for another match");
        }
        if let Some(player) = entry.lobby.player_mut(conn) {
            player.ready = !player.ready;
        }
        Ok(())
    }

    /// Start the match: host-only, at least two players, everyone ready.
    /// Spawns the authoritative tick task and its broadcast forwarder.
    pub fn start_match(
        &mut self,
        code: &str,
        conn: ConnId,
        levels: &dyn LevelSource,
        cfg: &MatchConfig,
        manager: SharedLobbyManager,
    ) -> Result<(), LobbyError> {
        let entry = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if !entry.lobby.is_host(conn) {
            return Err(LobbyError::NotHost);
        }
        if entry.lobby.status != LobbyStatus::Open {
            return Err(LobbyError::MatchInProgress);
        }
        if entry.lobby.players.len() < 2 {
            return Err(LobbyError::TooFewPlayers);
        }
        if !entry.lobby.all_ready() {
            return Err(LobbyError::NotReady);
        }

        let level = resolve_level(levels, entry.lobby.level.as_ref().map(|r| r.id.as_str()));
        let level_name = entry
            .lobby
            .level
            .as_ref()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| level.name.clone());

        let seed = self.rng.random();
        let sim = MatchSim::new(&entry.lobby.players, &level, cfg.rules(), seed);
        let (cmd_tx, broadcast_rx, match_task) = spawn_match_session(
            sim,
            MatchSessionConfig {
                code: code.to_string(),
                countdown_from: cfg.countdown_secs,
                tick_rate_hz: cfg.tick_rate_hz,
            },
        );

        let senders = entry.connections.clone();
        let code_owned = code.to_string();
        let forward_task = tokio::spawn(async move {
            crate::match_loop::forward_broadcasts(
                broadcast_rx,
                senders,
                manager,
                code_owned,
                level_name,
            )
            .await;
        });

        entry.match_command_tx = Some(cmd_tx);
        entry.match_task = Some(match_task);
        entry.forward_task = Some(forward_task);
        entry.lobby.status = LobbyStatus::Started;
        tracing::info!(lobby = code, "Match started");
        Ok(())
    }

    /// Route a key edge into the lobby's running match, if the sender is
    /// actually a member.
    pub fn route_input(&self, code: &str, conn: ConnId, key: InputKey, pressed: bool) {
        if self.by_conn.get(&conn).map(String::as_str) != Some(code) {
            return;
        }
        if let Some(entry) = self.lobbies.get(code)
            && let Some(ref cmd_tx) = entry.match_command_tx
            && cmd_tx
                .send(MatchCommand::Input { conn, key, pressed })
                .is_err()
        {
            tracing::debug!(conn, lobby = code, "Match session gone");
        }
    }

    /// Apply end-of-match effects exactly once. A stale completion for a
    /// lobby that was torn down or already reset is absorbed silently.
    pub fn finish_match(&mut self, code: &str, outcome: &MatchOutcome, level_name: &str) {
        {
            let Some(entry) = self.lobbies.get_mut(code) else {
                return;
            };
            if entry.lobby.status != LobbyStatus::Started {
                return;
            }
            entry.lobby.status = LobbyStatus::MatchOver;
            entry.match_command_tx = None;
            entry.match_task = None;
            entry.forward_task = None;
        }

        if let Err(e) = self
            .store
            .record_result(code, outcome.winner.as_deref(), level_name)
        {
            tracing::warn!(lobby = code, error = %e, "Store result failed");
        }
        if let Err(e) = self
            .store
            .increment_stats(&outcome.participants, outcome.winner.as_deref())
        {
            tracing::warn!(lobby = code, error = %e, "Store stats failed");
        }

        let msg = ServerMessage::GameOver(GameOverMsg {
            winner: outcome.winner.clone(),
            rankings: outcome.rankings.clone(),
        });
        if let Ok(data) = encode_server_message(&msg) {
            self.broadcast_to_lobby(code, &data);
        }
        tracing::info!(lobby = code, winner = ?outcome.winner, "Match finished");
    }

    /// Remove a connection from whatever lobby it is in. An Open or finished
    /// lobby loses one player (with host migration); a Started lobby is torn
    /// down for everyone. Returns the code of a destroyed lobby, if any.
    pub fn leave(&mut self, conn: ConnId) -> Option<String> {
        let code = self.by_conn.remove(&conn)?;
        let status = self.lobbies.get(&code)?.lobby.status;

        if status == LobbyStatus::Started {
            if let Some(entry) = self.lobbies.get_mut(&code) {
                entry.connections.remove(&conn);
                entry.lobby.players.retain(|p| p.conn != conn);
            }
            self.disband(&code, DISBAND_NOTICE);
            return Some(code);
        }

        let became_empty = {
            let entry = self.lobbies.get_mut(&code)?;
            entry.connections.remove(&conn);
            entry.lobby.players.retain(|p| p.conn != conn);
            if !entry.lobby.players.is_empty() && entry.lobby.host == conn {
                // Earliest remaining player takes over; the host is always
                // ready by convention.
                let promoted = &mut entry.lobby.players[0];
                entry.lobby.host = promoted.conn;
                promoted.ready = true;
                tracing::info!(lobby = %code, conn = entry.lobby.host, "Host migrated");
            }
            entry.lobby.players.is_empty()
        };

        if became_empty {
            self.destroy(&code);
            Some(code)
        } else {
            self.broadcast_lobby_state(&code);
            None
        }
    }

    /// Tear down a Started lobby: everyone gets a disband notice and the
    /// lobby record is dropped. No partial continuation.
    fn disband(&mut self, code: &str, message: &str) {
        let msg = ServerMessage::LobbyClosed(LobbyClosedMsg {
            message: message.to_string(),
        });
        if let Ok(data) = encode_server_message(&msg) {
            self.broadcast_to_lobby(code, &data);
        }
        self.destroy(code);
    }

    /// Drop a lobby and everything attached to it, including a running match
    /// task. A tick that fires during teardown finds its channel closed and
    /// dies quietly.
    fn destroy(&mut self, code: &str) {
        let Some(entry) = self.lobbies.remove(code) else {
            return;
        };
        if let Some(ref cmd_tx) = entry.match_command_tx {
            let _ = cmd_tx.send(MatchCommand::Abort);
        }
        if let Some(task) = entry.match_task {
            task.abort();
        }
        if let Some(task) = entry.forward_task {
            task.abort();
        }
        for p in &entry.lobby.players {
            self.by_conn.remove(&p.conn);
        }
        if let Err(e) = self.store.delete_match_record(code) {
            tracing::warn!(lobby = code, error = %e, "Store delete failed");
        }
        tracing::info!(lobby = code, "Lobby destroyed");
    }

    /// Remove Open lobbies older than `max_age`. Started and just-finished
    /// lobbies are exempt. Returns the number removed.
    pub fn sweep_idle_lobbies(&mut self, max_age: Duration) -> usize {
        let stale: Vec<String> = self
            .lobbies
            .iter()
            .filter(|(_, e)| {
                e.lobby.status == LobbyStatus::Open && e.lobby.created_at.elapsed() > max_age
            })
            .map(|(code, _)| code.clone())
            .collect();
        for code in &stale {
            tracing::info!(lobby = %code, "Sweeping idle lobby");
            self.disband(code, "Lobby closed due to inactivity.");
        }
        stale.len()
    }

    /// Broadcast raw bytes to every connection in a lobby. Slow clients are
    /// skipped, not waited on.
    pub fn broadcast_to_lobby(&self, code: &str, data: &[u8]) {
        if let Some(entry) = self.lobbies.get(code) {
            let bytes = Bytes::copy_from_slice(data);
            for (&conn, sender) in &entry.connections {
                if sender.try_send(bytes.clone()).is_err() {
                    tracing::debug!(conn, lobby = code, "Skipping broadcast to slow client");
                }
            }
        }
    }

    /// Build and broadcast the current lobby view to all members.
    pub fn broadcast_lobby_state(&self, code: &str) {
        let Some(entry) = self.lobbies.get(code) else {
            return;
        };
        let msg = ServerMessage::LobbyState(lobby_state_msg(&entry.lobby));
        match encode_server_message(&msg) {
            Ok(data) => self.broadcast_to_lobby(code, &data),
            Err(e) => tracing::error!(lobby = code, error = %e, "Failed to encode lobby state"),
        }
    }

    pub fn username_of(&self, code: &str, conn: ConnId) -> Option<String> {
        self.lobbies
            .get(code)?
            .lobby
            .player(conn)
            .map(|p| p.username.clone())
    }

    pub fn lobby(&self, code: &str) -> Option<&Lobby> {
        self.lobbies.get(code).map(|e| &e.lobby)
    }

    pub fn lobby_of_conn(&self, conn: ConnId) -> Option<&str> {
        self.by_conn.get(&conn).map(String::as_str)
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    #[cfg(test)]
    fn lobby_mut(&mut self, code: &str) -> Option<&mut Lobby> {
        self.lobbies.get_mut(code).map(|e| &mut e.lobby)
    }
}

fn lobby_state_msg(lobby: &Lobby) -> LobbyStateMsg {
    LobbyStateMsg {
        code: lobby.code.clone(),
        host: lobby.host,
        status: lobby.status,
        level: lobby.level.clone(),
        players: lobby.players.clone(),
    }
}
