use std::collections::HashMap;
use std::sync::Mutex;

use tagrush_core::player::{ConnId, LobbyPlayer, PlayerColor};

/// Error from the persistence collaborator. Write failures are logged and
/// ignored; the authoritative in-memory outcome is never rolled back.
#[derive(Debug)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Match and statistics storage consumed by the session core.
///
/// Durable implementations live outside this crate; `InMemoryStore` stands
/// in for tests and single-node use. None of these calls may block the tick
/// loop — terminal writes happen on the match forwarder task.
pub trait MatchStore: Send + Sync {
    fn create_match_record(
        &self,
        code: &str,
        host: &LobbyPlayer,
        players: &[LobbyPlayer],
    ) -> Result<(), StoreError>;

    fn append_player(&self, code: &str, player: &LobbyPlayer) -> Result<(), StoreError>;

    fn update_player_color(
        &self,
        code: &str,
        conn: ConnId,
        color: PlayerColor,
    ) -> Result<(), StoreError>;

    fn record_result(
        &self,
        code: &str,
        winner: Option<&str>,
        level_name: &str,
    ) -> Result<(), StoreError>;

    fn increment_stats(&self, usernames: &[String], winner: Option<&str>)
    -> Result<(), StoreError>;

    fn delete_match_record(&self, code: &str) -> Result<(), StoreError>;
}

/// One stored player row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPlayer {
    pub conn: ConnId,
    pub username: String,
    pub color: PlayerColor,
}

/// One stored match row.
#[derive(Debug, Clone, Default)]
pub struct MatchRecord {
    pub host: String,
    pub players: Vec<StoredPlayer>,
    pub winner: Option<String>,
    pub level_name: Option<String>,
}

/// Aggregate per-user statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub played: u32,
    pub wins: u32,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<String, MatchRecord>,
    stats: HashMap<String, PlayerStats>,
}

/// In-memory store mirroring the persistent schema.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, code: &str) -> Option<MatchRecord> {
        self.inner.lock().ok()?.records.get(code).cloned()
    }

    pub fn stats_for(&self, username: &str) -> PlayerStats {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.stats.get(username).copied())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError("store mutex poisoned".to_string()))
    }
}

impl MatchStore for InMemoryStore {
    fn create_match_record(
        &self,
        code: &str,
        host: &LobbyPlayer,
        players: &[LobbyPlayer],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.records.insert(
            code.to_string(),
            MatchRecord {
                host: host.username.clone(),
                players: players
                    .iter()
                    .map(|p| StoredPlayer {
                        conn: p.conn,
                        username: p.username.clone(),
                        color: p.color,
                    })
                    .collect(),
                winner: None,
                level_name: None,
            },
        );
        Ok(())
    }

    fn append_player(&self, code: &str, player: &LobbyPlayer) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let record = inner
            .records
            .get_mut(code)
            .ok_or_else(|| StoreError(format!("no record for lobby {code}")))?;
        record.players.push(StoredPlayer {
            conn: player.conn,
            username: player.username.clone(),
            color: player.color,
        });
        Ok(())
    }

    fn update_player_color(
        &self,
        code: &str,
        conn: ConnId,
        color: PlayerColor,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let record = inner
            .records
            .get_mut(code)
            .ok_or_else(|| StoreError(format!("no record for lobby {code}")))?;
        if let Some(p) = record.players.iter_mut().find(|p| p.conn == conn) {
            p.color = color;
        }
        Ok(())
    }

    fn record_result(
        &self,
        code: &str,
        winner: Option<&str>,
        level_name: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let record = inner
            .records
            .get_mut(code)
            .ok_or_else(|| StoreError(format!("no record for lobby {code}")))?;
        record.winner = winner.map(str::to_string);
        record.level_name = Some(level_name.to_string());
        Ok(())
    }

    fn increment_stats(
        &self,
        usernames: &[String],
        winner: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        for name in usernames {
            let stats = inner.stats.entry(name.clone()).or_default();
            stats.played += 1;
            if winner == Some(name.as_str()) {
                stats.wins += 1;
            }
        }
        Ok(())
    }

    fn delete_match_record(&self, code: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.records.remove(code);
        Ok(())
    }
}
