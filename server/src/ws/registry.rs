use axum::extract::ws::Message;
use dashmap::DashMap;
use uuid::Uuid;

use super::connection::{Connection, SendFailure};
use super::protocol::ServerEvent;

struct Entry {
    connection: Connection,
    name: String,
}

/// Tracks all live connections and fans events out to them.
///
/// The map is only touched to register, unregister, or snapshot the
/// current recipients. Sends happen on the snapshot, after the map's
/// shard locks have been released, and only enqueue onto each
/// connection's bounded outbound queue.
pub struct SessionRegistry {
    connections: DashMap<Uuid, Entry>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Add a connection under `name`. Names need not be unique.
    pub fn register(&self, connection: Connection, name: &str) {
        let id = connection.id();
        self.connections.insert(
            id,
            Entry {
                connection,
                name: name.to_string(),
            },
        );

        tracing::debug!(
            connection_id = %id,
            name = %name,
            connections = self.connections.len(),
            "Connection registered"
        );
    }

    /// Remove a connection. Returns false if it was already gone.
    pub fn unregister(&self, id: Uuid) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            tracing::debug!(connection_id = %id, "Connection unregistered");
        }
        removed
    }

    /// Whether any registered connection currently holds `name`.
    pub fn is_name_online(&self, name: &str) -> bool {
        self.connections.iter().any(|entry| entry.value().name == name)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn snapshot(&self) -> Vec<Connection> {
        self.connections
            .iter()
            .map(|entry| entry.value().connection.clone())
            .collect()
    }

    /// Deliver a frame to every registered connection. A connection whose
    /// queue is full or closed is evicted; delivery to the rest continues.
    pub fn broadcast_raw(&self, message: Message) {
        let recipients = self.snapshot();
        for connection in &recipients {
            deliver(connection, message.clone());
        }
        tracing::trace!(recipients = recipients.len(), "Broadcast frame");
    }

    /// Encode an event once and broadcast it.
    pub fn broadcast_event(&self, event: &ServerEvent) {
        match event.to_message() {
            Ok(message) => self.broadcast_raw(message),
            Err(e) => tracing::warn!(error = %e, "Failed to encode broadcast event"),
        }
    }
}

/// Queue one frame for one connection, evicting it on failure.
pub fn deliver(connection: &Connection, message: Message) -> bool {
    match connection.send(message) {
        Ok(()) => true,
        Err(failure) => {
            let reason = match failure {
                SendFailure::Full => "outbound queue full",
                SendFailure::Closed => "connection closed",
            };
            tracing::warn!(
                connection_id = %connection.id(),
                reason = reason,
                "Evicting connection"
            );
            connection.evict();
            false
        }
    }
}
