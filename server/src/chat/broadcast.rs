//! Broadcast helpers for chat events.
//! Wrap domain records in a [`ServerEvent`] and hand them to the registry.

use crate::db::models::ChatMessage;
use crate::db::StoreError;
use crate::state::AppState;
use crate::ws::protocol::{MessageEvent, ServerEvent};
use crate::ws::SessionRegistry;

/// Broadcast a committed message to every live connection.
pub fn broadcast_new_message(registry: &SessionRegistry, message: &ChatMessage) {
    registry.broadcast_event(&ServerEvent::Message(MessageEvent::live(message)));
}

/// Broadcast a live-only system notice.
pub fn broadcast_notice(registry: &SessionRegistry, content: String) {
    registry.broadcast_event(&ServerEvent::Message(MessageEvent::system(content)));
}

/// Read the current roster from the store and broadcast it.
pub async fn broadcast_roster(state: &AppState) -> Result<(), StoreError> {
    let users = state.store.get_all_users().await?;
    state.registry.broadcast_event(&ServerEvent::roster(users));
    Ok(())
}
