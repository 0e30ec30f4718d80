//! JSON wire format for the chat socket.
//!
//! Inbound frames decode into [`InboundFrame`]: either the structured
//! `{"type":"message", ...}` shape or the raw text of anything else.
//! Outbound frames are [`ServerEvent`]s serialized as tagged JSON objects.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::models::{ChatMessage, PresenceRecord, MESSAGE_TYPE_SYSTEM, MESSAGE_TYPE_TEXT};

/// Result of decoding one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A well-formed `{"type":"message"}` object.
    Structured {
        message_type: String,
        content: String,
    },
    /// Anything else; the whole payload is the message content.
    RawText(String),
}

impl InboundFrame {
    pub fn message_type(&self) -> &str {
        match self {
            Self::Structured { message_type, .. } => message_type,
            Self::RawText(_) => MESSAGE_TYPE_TEXT,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Structured { content, .. } => content,
            Self::RawText(text) => text,
        }
    }
}

/// Decode a client frame. Never fails: unrecognised input is raw text.
pub fn decode_inbound(raw: &str) -> InboundFrame {
    if !raw.starts_with('{') {
        return InboundFrame::RawText(raw.to_string());
    }

    let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(raw) else {
        return InboundFrame::RawText(raw.to_string());
    };

    if payload.get("type").and_then(Value::as_str) != Some("message") {
        return InboundFrame::RawText(raw.to_string());
    }

    let message_type = payload
        .get("message_type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or(MESSAGE_TYPE_TEXT)
        .to_string();

    let content = match payload.get("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    InboundFrame::Structured {
        message_type,
        content,
    }
}

/// A chat line as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_type: String,
    /// `None` marks a system notice.
    pub from: Option<String>,
    pub content: String,
    pub created_at: Option<String>,
    pub history: bool,
}

impl MessageEvent {
    /// Live broadcast of a committed message.
    pub fn live(message: &ChatMessage) -> Self {
        Self::from_stored(message, false)
    }

    /// Private backlog replay of a committed message.
    pub fn history(message: &ChatMessage) -> Self {
        Self::from_stored(message, true)
    }

    fn from_stored(message: &ChatMessage, history: bool) -> Self {
        Self {
            message_type: message.message_type.clone(),
            from: Some(message.sender_name.clone()),
            content: message.content.clone(),
            created_at: Some(message.created_at.clone()),
            history,
        }
    }

    /// Live-only system notice (join/leave), not part of the log.
    pub fn system(content: String) -> Self {
        Self {
            message_type: MESSAGE_TYPE_SYSTEM.to_string(),
            from: None,
            content,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            history: false,
        }
    }
}

/// One roster entry in a `users` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    pub last_seen: String,
    pub is_online: bool,
}

impl From<PresenceRecord> for UserEntry {
    fn from(record: PresenceRecord) -> Self {
        Self {
            name: record.name,
            last_seen: record.last_seen_at,
            is_online: record.is_online,
        }
    }
}

/// Everything the server pushes over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    Message(MessageEvent),
    Users { items: Vec<UserEntry> },
}

impl ServerEvent {
    pub fn roster(records: Vec<PresenceRecord>) -> Self {
        Self::Users {
            items: records.into_iter().map(UserEntry::from).collect(),
        }
    }

    /// Encode as a websocket text frame.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        serde_json::to_string(self).map(|json| Message::Text(json.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_message_decodes() {
        let frame = decode_inbound(r#"{"type":"message","message_type":"text","content":"hi"}"#);
        assert_eq!(
            frame,
            InboundFrame::Structured {
                message_type: "text".to_string(),
                content: "hi".to_string(),
            }
        );
    }

    #[test]
    fn test_plain_text_falls_back_to_raw() {
        let frame = decode_inbound("hello world");
        assert_eq!(frame, InboundFrame::RawText("hello world".to_string()));
        assert_eq!(frame.message_type(), "text");
        assert_eq!(frame.content(), "hello world");
    }

    #[test]
    fn test_broken_json_falls_back_to_raw() {
        let raw = r#"{"type":"message","content":"#;
        assert_eq!(decode_inbound(raw), InboundFrame::RawText(raw.to_string()));
    }

    #[test]
    fn test_other_type_is_raw_text() {
        let raw = r#"{"type":"typing"}"#;
        assert_eq!(decode_inbound(raw).content(), raw);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let frame = decode_inbound(r#"{"type":"message","message_type":""}"#);
        assert_eq!(frame.message_type(), "text");
        assert_eq!(frame.content(), "");
    }

    #[test]
    fn test_non_string_content_is_stringified() {
        let frame = decode_inbound(r#"{"type":"message","content":42}"#);
        assert_eq!(frame.content(), "42");
    }

    #[test]
    fn test_live_message_event_shape() {
        let stored = ChatMessage {
            id: 7,
            sender_name: "alice".to_string(),
            content: "hi".to_string(),
            message_type: "text".to_string(),
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
        };
        let value = serde_json::to_value(ServerEvent::Message(MessageEvent::live(&stored))).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "message",
                "message_type": "text",
                "from": "alice",
                "content": "hi",
                "created_at": "2026-01-01T00:00:00+00:00",
                "history": false,
            })
        );
    }

    #[test]
    fn test_system_notice_has_null_sender() {
        let value =
            serde_json::to_value(ServerEvent::Message(MessageEvent::system("bob joined the chat".into())))
                .unwrap();
        assert_eq!(value["from"], Value::Null);
        assert_eq!(value["message_type"], "system");
        assert_eq!(value["history"], false);
    }

    #[test]
    fn test_users_event_shape() {
        let event = ServerEvent::roster(vec![PresenceRecord {
            name: "alice".to_string(),
            last_seen_at: "2026-01-01T00:00:00+00:00".to_string(),
            is_online: true,
        }]);
        assert_eq!(
            serde_json::to_value(event).unwrap(),
            json!({
                "type": "users",
                "items": [{"name": "alice", "last_seen": "2026-01-01T00:00:00+00:00", "is_online": true}],
            })
        );
    }
}
