use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::player::{ConnId, LobbyPlayer, PlayerColor};

/// Maximum players per lobby. Matches the color palette size.
pub const MAX_PLAYERS: usize = 4;

/// Lobby code length in characters.
pub const CODE_LEN: usize = 6;

/// Symbols lobby codes are drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw a lobby code of `CODE_LEN` uniform symbols from `CODE_ALPHABET`.
///
/// Uniqueness against live lobbies is the registry's job; collisions are
/// handled there with a retry loop.
pub fn generate_lobby_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Whether `code` has the shape of a lobby code.
pub fn is_valid_lobby_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

/// Current state of a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyStatus {
    Open,
    Started,
    MatchOver,
}

/// The host's level selection. `None` means the built-in default level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRef {
    pub id: String,
    pub name: String,
}

/// A pre-match grouping of up to four players identified by a short code.
///
/// The host is the player whose connection equals `host`; this is derived,
/// never stored per player.
#[derive(Debug, Clone)]
pub struct Lobby {
    pub code: String,
    pub host: ConnId,
    pub players: Vec<LobbyPlayer>,
    pub status: LobbyStatus,
    pub level: Option<LevelRef>,
    pub created_at: Instant,
}

impl Lobby {
    /// Create a lobby with the creator as sole player and host.
    /// The host is always ready by convention.
    pub fn new(code: String, host: ConnId, username: String) -> Self {
        Self {
            code,
            host,
            players: vec![LobbyPlayer {
                conn: host,
                username,
                ready: true,
                color: PlayerColor::PALETTE[0],
            }],
            status: LobbyStatus::Open,
            level: None,
            created_at: Instant::now(),
        }
    }

    pub fn player(&self, conn: ConnId) -> Option<&LobbyPlayer> {
        self.players.iter().find(|p| p.conn == conn)
    }

    pub fn player_mut(&mut self, conn: ConnId) -> Option<&mut LobbyPlayer> {
        self.players.iter_mut().find(|p| p.conn == conn)
    }

    pub fn is_host(&self, conn: ConnId) -> bool {
        self.host == conn
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn all_ready(&self) -> bool {
        self.players.iter().all(|p| p.ready)
    }

    /// First palette color not held by any player, falling back to the first
    /// palette entry if all are somehow in use.
    pub fn first_free_color(&self) -> PlayerColor {
        PlayerColor::PALETTE
            .iter()
            .copied()
            .find(|c| !self.players.iter().any(|p| p.color == *c))
            .unwrap_or(PlayerColor::PALETTE[0])
    }

    /// Whether `color` is held by a player other than `conn`.
    pub fn color_taken_by_other(&self, conn: ConnId, color: PlayerColor) -> bool {
        self.players
            .iter()
            .any(|p| p.conn != conn && p.color == color)
    }
}
