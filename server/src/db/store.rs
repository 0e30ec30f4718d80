//! Async facade over the SQLite message log and presence table.
//!
//! Every call is one statement executed on the blocking pool while holding
//! the connection mutex, so writes are serialized and atomic per call.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use thiserror::Error;

use super::models::{ChatMessage, PresenceRecord};
use super::DbPool;

/// Errors surfaced by the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A previous holder panicked while holding the connection lock
    #[error("database lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Durable message log + presence table.
#[derive(Clone)]
pub struct ChatStore {
    db: DbPool,
}

impl ChatStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Run one closure against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn).map_err(StoreError::from)
        })
        .await?
    }

    /// Append a message and return the committed row.
    pub async fn insert_message(
        &self,
        sender_name: &str,
        content: &str,
        message_type: &str,
    ) -> Result<ChatMessage, StoreError> {
        let sender_name = sender_name.to_string();
        let content = content.to_string();
        let message_type = message_type.to_string();

        self.run(move |conn| {
            let created_at = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO messages (sender_name, content, message_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sender_name, content, message_type, created_at],
            )?;

            Ok(ChatMessage {
                id: conn.last_insert_rowid(),
                sender_name,
                content,
                message_type,
                created_at,
            })
        })
        .await
    }

    /// The newest `limit` messages, oldest first (backlog replay order).
    pub async fn get_recent_messages(&self, limit: u32) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, sender_name, content, message_type, created_at
                     FROM messages ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], message_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        messages.reverse();
        Ok(messages)
    }

    /// A page of messages, newest first.
    pub async fn get_messages(&self, limit: u32, offset: i64) -> Result<Vec<ChatMessage>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_name, content, message_type, created_at
                 FROM messages ORDER BY id DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit, offset], message_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    /// Ensure a presence row exists for `name` and refresh its last_seen.
    /// Never touches is_online.
    pub async fn upsert_user(&self, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO users (name, last_seen, is_online) VALUES (?1, ?2, 0)
                 ON CONFLICT(name) DO UPDATE SET last_seen = excluded.last_seen",
                params![name, Utc::now().to_rfc3339()],
            )
            .map(|_| ())
        })
        .await
    }

    pub async fn set_user_online(&self, name: &str, online: bool) -> Result<(), StoreError> {
        let name = name.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO users (name, last_seen, is_online) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                    is_online = excluded.is_online,
                    last_seen = excluded.last_seen",
                params![name, Utc::now().to_rfc3339(), online],
            )
            .map(|_| ())
        })
        .await
    }

    /// All presence rows: online first, then by name.
    pub async fn get_all_users(&self) -> Result<Vec<PresenceRecord>, StoreError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, last_seen, is_online FROM users
                 ORDER BY is_online DESC, name ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(PresenceRecord {
                    name: row.get(0)?,
                    last_seen_at: row.get(1)?,
                    is_online: row.get(2)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    /// Mark every user offline. Run at startup, when no connection is live.
    pub async fn reset_presence(&self) -> Result<usize, StoreError> {
        self.run(|conn| conn.execute("UPDATE users SET is_online = 0 WHERE is_online = 1", []))
            .await
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        sender_name: row.get(1)?,
        content: row.get(2)?,
        message_type: row.get(3)?,
        created_at: row.get(4)?,
    })
}
