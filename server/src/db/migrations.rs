use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking, no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: message log and presence

CREATE TABLE messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_name TEXT NOT NULL,
    content TEXT NOT NULL,
    message_type TEXT NOT NULL DEFAULT 'text',
    created_at TEXT NOT NULL
);

CREATE TABLE users (
    name TEXT PRIMARY KEY,
    last_seen TEXT NOT NULL,
    is_online INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_users_online_name ON users(is_online DESC, name ASC);
",
        ),
    ])
}
