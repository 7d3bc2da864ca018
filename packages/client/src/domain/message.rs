//! Chat message types.

use chrono::{DateTime, FixedOffset};
use hiroma_shared::time::parse_broker_timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::RoomId;

/// Sender identifier could not be normalized to a number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sender id must be numeric, got '{0}'")]
pub struct InvalidSenderId(pub String);

/// Sender identifier as supplied by callers or seen on the wire.
///
/// The broker keys users by a numeric id, but upstream code frequently holds
/// it as a string. [`SenderId::normalize`] reconciles both forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SenderId {
    Number(i64),
    Text(String),
}

impl SenderId {
    /// Canonical numeric form
    pub fn normalize(&self) -> Result<i64, InvalidSenderId> {
        match self {
            SenderId::Number(n) => Ok(*n),
            SenderId::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| InvalidSenderId(s.clone())),
        }
    }
}

impl From<i64> for SenderId {
    fn from(value: i64) -> Self {
        SenderId::Number(value)
    }
}

impl From<&str> for SenderId {
    fn from(value: &str) -> Self {
        SenderId::Text(value.to_string())
    }
}

impl From<String> for SenderId {
    fn from(value: String) -> Self {
        SenderId::Text(value)
    }
}

/// Kind of a message, derived from its optional `messageType` tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Ordinary chat text (also the default when no tag is present)
    Chat,
    /// A participant joined the room
    Enter,
    /// A participant left the room
    Leave,
    /// Any tag this client does not know about
    Other(String),
}

impl MessageKind {
    /// Classify a raw `messageType` tag (case-insensitive)
    pub fn from_tag(tag: Option<&str>) -> Self {
        let Some(tag) = tag else {
            return MessageKind::Chat;
        };
        match tag.trim().to_ascii_uppercase().as_str() {
            "" | "CHAT" | "TALK" => MessageKind::Chat,
            "ENTER" | "JOIN" => MessageKind::Enter,
            "LEAVE" | "EXIT" => MessageKind::Leave,
            _ => MessageKind::Other(tag.to_string()),
        }
    }
}

/// A realtime chat event routed to exactly one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default)]
    pub content: String,
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

impl ChatMessage {
    /// Kind of this message
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_tag(self.message_type.as_deref())
    }

    /// Parsed broker timestamp, if present and well-formed
    pub fn sent_at(&self) -> Option<DateTime<FixedOffset>> {
        self.timestamp.as_deref().and_then(parse_broker_timestamp)
    }
}

/// Message fields a caller supplies to `send`; the broker assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub sender_id: SenderId,
    pub sender_name: String,
    pub sender_email: String,
    pub content: String,
    pub message_type: Option<String>,
}

impl OutgoingMessage {
    pub fn new(
        sender_id: impl Into<SenderId>,
        sender_name: impl Into<String>,
        sender_email: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            sender_email: sender_email.into(),
            content: content.into(),
            message_type: None,
        }
    }

    /// Tag the message, e.g. `"LEAVE"` for a leave notice
    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }
}
