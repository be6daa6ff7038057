use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::RwLock;

use tagrush_core::level::LevelSource;
use tagrush_core::player::ConnId;

use crate::config::ServerConfig;
use crate::identity::{IdentityProvider, TrustedIdentity};
use crate::levels::BuiltinLevels;
use crate::lobby_manager::LobbyManager;
use crate::persist::{InMemoryStore, MatchStore};

pub type SharedLobbyManager = Arc<RwLock<LobbyManager>>;

#[derive(Clone)]
pub struct AppState {
    pub lobbies: SharedLobbyManager,
    pub levels: Arc<dyn LevelSource>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
    next_conn_id: Arc<AtomicU64>,
}

impl AppState {
    /// Build state with the default collaborators: in-memory persistence,
    /// built-in levels, and claimed-name identity.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(BuiltinLevels::new()),
            Arc::new(TrustedIdentity),
        )
    }

    pub fn with_collaborators(
        config: ServerConfig,
        store: Arc<dyn MatchStore>,
        levels: Arc<dyn LevelSource>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            lobbies: Arc::new(RwLock::new(LobbyManager::new(store))),
            levels,
            identity,
            config: Arc::new(config),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn alloc_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// RAII guard for the live WebSocket connection count.
pub struct ConnectionGuard {
    count: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self { count }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }
}
