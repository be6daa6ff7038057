use axum::Json;
use axum::extract::State;

use crate::state::AppState;

/// Liveness probe with a small census.
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let lobbies = state.lobbies.read().await;
    Json(serde_json::json!({
        "status": "ok",
        "lobbies": lobbies.lobby_count(),
        "connections": state
            .ws_connection_count
            .load(std::sync::atomic::Ordering::Relaxed),
    }))
}
