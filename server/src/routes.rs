use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::chat::{messages, presence};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoint (display name via ?name=)
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    // Read-only history and roster
    let chat_routes = Router::new()
        .route("/messages", get(messages::list_messages))
        .route("/users", get(presence::list_users));

    // Liveness
    let health = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(chat_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
