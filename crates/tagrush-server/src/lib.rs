pub mod config;
pub mod error;
pub mod health;
pub mod identity;
pub mod levels;
pub mod lobby_manager;
pub mod match_loop;
pub mod persist;
pub mod state;
pub mod ws;

use std::time::Duration;

use axum::Router;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);
    let app = router_for(state.clone());
    (app, state)
}

/// Build the router over pre-assembled state (custom collaborators).
pub fn router_for(state: AppState) -> Router<()> {
    Router::new()
        .route("/ws", axum::routing::get(ws::ws_handler))
        .route("/healthz", axum::routing::get(health::healthz))
        .with_state(state)
}

/// Background task that periodically removes idle Open lobbies.
/// Started lobbies are left alone no matter how old they get.
pub fn spawn_idle_sweeper(state: AppState) {
    tokio::spawn(async move {
        let period = Duration::from_secs(state.config.lobbies.sweep_interval_secs);
        let max_age = Duration::from_secs(state.config.lobbies.idle_timeout_secs);
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // the immediate first tick

        loop {
            ticker.tick().await;
            let removed = state.lobbies.write().await.sweep_idle_lobbies(max_age);
            if removed > 0 {
                tracing::info!(removed, "Idle lobby sweep");
            }
        }
    });
}
