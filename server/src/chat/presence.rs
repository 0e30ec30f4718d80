//! Presence bookkeeping.
//!
//! The store holds the durable online flag; the registry knows whether a
//! live connection exists. Callers hold the sequencer while flipping flags
//! so a join and a leave under the same name cannot interleave.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::db::StoreError;
use crate::state::AppState;
use crate::ws::protocol::UserEntry;

/// Record that `name` has a live connection.
pub async fn mark_online(state: &AppState, name: &str) -> Result<(), StoreError> {
    state.store.upsert_user(name).await?;
    state.store.set_user_online(name, true).await
}

/// Flip `name` offline unless another live connection still holds it.
/// Returns whether the flag was flipped.
pub async fn mark_offline_if_gone(state: &AppState, name: &str) -> Result<bool, StoreError> {
    if state.registry.is_name_online(name) {
        tracing::debug!(name = %name, "Name still has live connections, staying online");
        return Ok(false);
    }
    state.store.set_user_online(name, false).await?;
    Ok(true)
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub count: usize,
    pub items: Vec<UserEntry>,
}

/// GET /users: current roster, online first then by name.
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UsersResponse>, StatusCode> {
    let users = state.store.get_all_users().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to load users");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let items: Vec<UserEntry> = users.into_iter().map(UserEntry::from).collect();
    Ok(Json(UsersResponse {
        count: items.len(),
        items,
    }))
}
