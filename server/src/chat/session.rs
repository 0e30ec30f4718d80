//! Per-connection chat lifecycle: join, message loop, leave.
//!
//! Transport-agnostic: the websocket actor feeds decoded text frames in
//! and all output goes through the connection's outbound queue.

use thiserror::Error;
use uuid::Uuid;

use crate::chat::{broadcast, presence};
use crate::db::models::ChatMessage;
use crate::db::StoreError;
use crate::state::AppState;
use crate::ws::protocol::{decode_inbound, MessageEvent, ServerEvent};
use crate::ws::{deliver, Connection};

/// Lifecycle phase of one connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joining,
    Active,
    Leaving,
    Closed,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation not allowed in state {0:?}")]
    InvalidState(SessionState),
}

/// Trim the requested name, or make up `anon-<8 hex>` when it is blank.
pub fn resolve_display_name(requested: Option<&str>) -> String {
    match requested.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => {
            let id = Uuid::new_v4().simple().to_string();
            format!("anon-{}", &id[..8])
        }
    }
}

pub struct ChatSession {
    app: AppState,
    connection: Connection,
    name: String,
    phase: SessionState,
    /// Set once the join notice went out; only then is a leave announced.
    announced: bool,
}

impl ChatSession {
    pub fn new(app: AppState, connection: Connection) -> Self {
        Self {
            app,
            connection,
            name: String::new(),
            phase: SessionState::Connecting,
            announced: false,
        }
    }

    pub fn phase(&self) -> SessionState {
        self.phase
    }

    /// Display name; empty until [`ChatSession::join`] runs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register, mark online, replay backlog to this connection only, then
    /// announce the join and the new roster to everyone.
    ///
    /// On error the session is left in `Joining`; the caller must still
    /// call [`ChatSession::leave`].
    pub async fn join(&mut self, requested_name: Option<&str>) -> Result<(), SessionError> {
        if self.phase != SessionState::Connecting {
            return Err(SessionError::InvalidState(self.phase));
        }
        self.phase = SessionState::Joining;
        self.name = resolve_display_name(requested_name);

        // Held until the backlog is queued: any message committed after
        // this point reaches us live, anything before is in the backlog.
        let _order = self.app.sequencer.lock().await;

        self.app.registry.register(self.connection.clone(), &self.name);
        presence::mark_online(&self.app, &self.name).await?;

        let backlog = self
            .app
            .store
            .get_recent_messages(self.app.settings.history_limit)
            .await?;
        for message in &backlog {
            self.send_private(&ServerEvent::Message(MessageEvent::history(message)));
        }

        broadcast::broadcast_notice(&self.app.registry, format!("{} joined the chat", self.name));
        self.announced = true;
        broadcast::broadcast_roster(&self.app).await?;

        self.phase = SessionState::Active;
        tracing::info!(
            connection_id = %self.connection.id(),
            name = %self.name,
            backlog = backlog.len(),
            "Session joined"
        );
        Ok(())
    }

    /// Decode one inbound frame, persist it, then broadcast it to everyone
    /// including the sender.
    pub async fn handle_frame(&mut self, raw: &str) -> Result<ChatMessage, SessionError> {
        if self.phase != SessionState::Active {
            return Err(SessionError::InvalidState(self.phase));
        }
        let frame = decode_inbound(raw);

        let _order = self.app.sequencer.lock().await;
        let message = self
            .app
            .store
            .insert_message(&self.name, frame.content(), frame.message_type())
            .await?;
        broadcast::broadcast_new_message(&self.app.registry, &message);

        Ok(message)
    }

    /// Unregister, announce the departure if the join was announced, flip
    /// presence if this was the name's last connection, and broadcast the
    /// roster. Idempotent.
    pub async fn leave(&mut self) {
        match self.phase {
            SessionState::Leaving | SessionState::Closed => return,
            SessionState::Connecting => {
                self.phase = SessionState::Closed;
                return;
            }
            SessionState::Joining | SessionState::Active => {}
        }
        self.phase = SessionState::Leaving;

        {
            let _order = self.app.sequencer.lock().await;

            self.app.registry.unregister(self.connection.id());
            if self.announced {
                broadcast::broadcast_notice(&self.app.registry, format!("{} left the chat", self.name));
            }

            if let Err(e) = presence::mark_offline_if_gone(&self.app, &self.name).await {
                tracing::warn!(name = %self.name, error = %e, "Failed to update presence on leave");
            }
            if let Err(e) = broadcast::broadcast_roster(&self.app).await {
                tracing::warn!(name = %self.name, error = %e, "Failed to broadcast roster on leave");
            }
        }

        self.phase = SessionState::Closed;
        tracing::info!(
            connection_id = %self.connection.id(),
            name = %self.name,
            "Session left"
        );
    }

    fn send_private(&self, event: &ServerEvent) {
        match event.to_message() {
            Ok(message) => {
                deliver(&self.connection, message);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, DbPool};
    use crate::state::SessionSettings;
    use axum::extract::ws::Message;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn app() -> AppState {
        AppState::new(open_in_memory().unwrap(), SessionSettings::default())
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                out.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        out
    }

    fn last_roster(events: &[Value]) -> Vec<(String, bool)> {
        events
            .iter()
            .rev()
            .find(|e| e["type"] == "users")
            .unwrap()["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| (u["name"].as_str().unwrap().to_string(), u["is_online"].as_bool().unwrap()))
            .collect()
    }

    async fn join(app: &AppState, name: &str) -> (ChatSession, mpsc::Receiver<Message>) {
        let (conn, rx) = Connection::open(64);
        let mut session = ChatSession::new(app.clone(), conn);
        session.join(Some(name)).await.unwrap();
        (session, rx)
    }

    #[test]
    fn test_display_name_trimmed() {
        assert_eq!(resolve_display_name(Some("  alice ")), "alice");
    }

    #[test]
    fn test_blank_name_gets_anon_fallback() {
        for requested in [None, Some(""), Some("   ")] {
            let name = resolve_display_name(requested);
            assert!(name.starts_with("anon-"));
            assert_eq!(name.len(), "anon-".len() + 8);
            assert!(name[5..].chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[tokio::test]
    async fn test_join_replays_history_then_notice_and_roster() {
        let app = app();
        for i in 0..25 {
            app.store.insert_message("old", &format!("m{i}"), "text").await.unwrap();
        }

        let (session, mut rx) = join(&app, "alice").await;
        assert_eq!(session.phase(), SessionState::Active);

        let events = drain(&mut rx);
        let history: Vec<_> = events.iter().filter(|e| e["history"] == true).collect();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0]["content"], "m5");
        assert_eq!(history[19]["content"], "m24");

        let notice = &events[20];
        assert_eq!(notice["message_type"], "system");
        assert_eq!(notice["from"], Value::Null);
        assert_eq!(notice["content"], "alice joined the chat");
        assert_eq!(last_roster(&events), vec![("alice".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_message_round_trip_to_all_connections() {
        let app = app();
        let (mut alice, mut rx_alice) = join(&app, "alice").await;
        let (_bob, mut rx_bob) = join(&app, "bob").await;
        drain(&mut rx_alice);
        drain(&mut rx_bob);

        alice
            .handle_frame(r#"{"type":"message","message_type":"text","content":"hi"}"#)
            .await
            .unwrap();

        for rx in [&mut rx_alice, &mut rx_bob] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0]["content"], "hi");
            assert_eq!(events[0]["message_type"], "text");
            assert_eq!(events[0]["from"], "alice");
            assert_eq!(events[0]["history"], false);
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_is_stored_as_text() {
        let app = app();
        let (mut alice, _rx) = join(&app, "alice").await;

        let stored = alice.handle_frame("hello world").await.unwrap();
        assert_eq!(stored.content, "hello world");
        assert_eq!(stored.message_type, "text");
        assert_eq!(app.store.get_messages(1, 0).await.unwrap()[0], stored);
    }

    #[tokio::test]
    async fn test_same_name_stays_online_until_last_connection_leaves() {
        let app = app();
        let (mut first, _rx1) = join(&app, "alice").await;
        let (mut second, mut rx2) = join(&app, "alice").await;
        let (_observer, mut rx_obs) = join(&app, "zed").await;
        drain(&mut rx2);
        drain(&mut rx_obs);

        first.leave().await;
        let events = drain(&mut rx_obs);
        assert!(last_roster(&events).contains(&("alice".to_string(), true)));
        assert!(app.store.get_all_users().await.unwrap()[0].is_online);

        second.leave().await;
        let events = drain(&mut rx_obs);
        assert!(last_roster(&events).contains(&("alice".to_string(), false)));
    }

    fn rename_table(db: &DbPool, from: &str, to: &str) {
        db.lock()
            .unwrap()
            .execute_batch(&format!("ALTER TABLE {from} RENAME TO {to}"))
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_join_is_not_announced_as_leave() {
        let db = open_in_memory().unwrap();
        let app = AppState::new(db.clone(), SessionSettings::default());
        let (_observer, mut rx_obs) = join(&app, "zed").await;
        drain(&mut rx_obs);

        rename_table(&db, "users", "users_parked");
        let (conn, _rx) = Connection::open(64);
        let mut session = ChatSession::new(app.clone(), conn);
        assert!(matches!(
            session.join(Some("alice")).await,
            Err(SessionError::Store(_))
        ));
        session.leave().await;
        rename_table(&db, "users_parked", "users");

        assert_eq!(session.phase(), SessionState::Closed);
        assert_eq!(app.registry.len(), 1);
        let events = drain(&mut rx_obs);
        assert!(events.iter().all(|e| e["content"] != "alice left the chat"));
    }

    #[tokio::test]
    async fn test_backlog_larger_than_buffer_does_not_evict_joiner() {
        let settings = SessionSettings {
            history_limit: 30,
            outbound_buffer: 4,
            ..SessionSettings::default()
        };
        let app = AppState::new(open_in_memory().unwrap(), settings);
        for i in 0..30 {
            app.store.insert_message("old", &format!("m{i}"), "text").await.unwrap();
        }

        let (conn, mut rx) = Connection::open(app.settings.queue_capacity());
        let mut session = ChatSession::new(app.clone(), conn.clone());
        session.join(Some("alice")).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.iter().filter(|e| e["history"] == true).count(), 30);
        assert_eq!(events[30]["content"], "alice joined the chat");
        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), conn.evicted())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let app = app();
        let (mut session, _rx) = join(&app, "alice").await;
        session.leave().await;
        session.leave().await;

        assert_eq!(session.phase(), SessionState::Closed);
        assert!(app.registry.is_empty());
        assert!(matches!(
            session.handle_frame("late").await,
            Err(SessionError::InvalidState(SessionState::Closed))
        ));
    }

    #[tokio::test]
    async fn test_late_joiner_gets_earlier_message_only_in_backlog() {
        let app = app();
        let (mut alice, _rx) = join(&app, "alice").await;
        alice.handle_frame("before").await.unwrap();

        let (_bob, mut rx_bob) = join(&app, "bob").await;
        alice.handle_frame("after").await.unwrap();

        let events = drain(&mut rx_bob);
        let contents: Vec<(String, bool)> = events
            .iter()
            .filter(|e| e["type"] == "message" && e["message_type"] == "text")
            .map(|e| (e["content"].as_str().unwrap().to_string(), e["history"].as_bool().unwrap()))
            .collect();
        assert_eq!(
            contents,
            vec![("before".to_string(), true), ("after".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_concurrent_senders_see_commit_order() {
        let app = app();
        let (_watcher, mut rx) = join(&app, "watcher").await;
        drain(&mut rx);

        let mut handles = Vec::new();
        for i in 0..4 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                let (conn, _rx) = Connection::open(256);
                let mut session = ChatSession::new(app, conn);
                let name = format!("sender-{i}");
                session.join(Some(name.as_str())).await.unwrap();
                for n in 0..5 {
                    session.handle_frame(&format!("{i}-{n}")).await.unwrap();
                }
                session.leave().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let live: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter(|e| e["type"] == "message" && e["message_type"] == "text")
            .map(|e| e["content"].as_str().unwrap().to_string())
            .collect();
        let mut stored: Vec<String> = app
            .store
            .get_messages(200, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        stored.reverse();
        assert_eq!(live, stored);
        assert_eq!(live.len(), 20);
    }
}
