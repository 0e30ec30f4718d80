//! Database row types for all tables.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

use serde::Serialize;

/// Message type used for ordinary chat text.
pub const MESSAGE_TYPE_TEXT: &str = "text";
/// Message type used for join/leave notices.
pub const MESSAGE_TYPE_SYSTEM: &str = "system";

/// Row in the messages table. Immutable once inserted; `id` is the
/// store-assigned sequence number and defines the log order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub sender_name: String,
    pub content: String,
    pub message_type: String,
    pub created_at: String,
}

/// Row in the users table, one per name ever seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceRecord {
    pub name: String,
    #[serde(rename = "last_seen")]
    pub last_seen_at: String,
    pub is_online: bool,
}
