//! JSON payload codec for chat messages.
//!
//! Inbound payloads are validated against an explicit schema rather than
//! duck-typed. The room id rule is versioned: the broker's current payloads
//! carry `roomId`, older ones carry `chatRoomId`, and both are accepted
//! in that order of precedence (see [`RoomIdField`]). Unknown fields are
//! ignored so the broker can add fields without breaking this client.

use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatMessage, InvalidRoomId, InvalidSenderId, OutgoingMessage, RoomId},
    error::ParseError,
};

/// Payload field a room id may be carried in, in order of precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomIdField {
    /// `roomId`, current payload shape
    RoomId,
    /// `chatRoomId`, legacy payload shape (also what this client publishes)
    ChatRoomId,
}

impl RoomIdField {
    /// Decode precedence
    pub const PRECEDENCE: [RoomIdField; 2] = [RoomIdField::RoomId, RoomIdField::ChatRoomId];

    pub fn name(self) -> &'static str {
        match self {
            RoomIdField::RoomId => "roomId",
            RoomIdField::ChatRoomId => "chatRoomId",
        }
    }

    fn value(self, wire: &WireMessage) -> Option<&WireScalar> {
        match self {
            RoomIdField::RoomId => wire.room_id.as_ref(),
            RoomIdField::ChatRoomId => wire.chat_room_id.as_ref(),
        }
    }
}

/// Message DTO in the shape the broker's publish endpoint expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_email: String,
    pub content: String,
    pub chat_room_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

impl OutboundMessage {
    /// Bind a caller's message to a room, normalizing the sender id to a number
    pub fn build(room_id: RoomId, message: OutgoingMessage) -> Result<Self, InvalidSenderId> {
        Ok(Self {
            sender_id: message.sender_id.normalize()?,
            sender_name: message.sender_name,
            sender_email: message.sender_email,
            content: message.content,
            chat_room_id: room_id.get(),
            message_type: message.message_type,
        })
    }
}

/// Scalar that may arrive as either a JSON number or a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireScalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl WireScalar {
    fn as_i64(&self) -> Option<i64> {
        match self {
            WireScalar::Int(n) => Some(*n),
            // `as` saturates, so out-of-range values must be rejected first
            WireScalar::Float(f)
                if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f) =>
            {
                Some(*f as i64)
            }
            WireScalar::Float(_) => None,
            WireScalar::Text(s) => s.trim().parse().ok(),
        }
    }

    fn into_string(self) -> String {
        match self {
            WireScalar::Int(n) => n.to_string(),
            WireScalar::Float(f) => f.to_string(),
            WireScalar::Text(s) => s,
        }
    }

    fn raw(&self) -> String {
        self.clone().into_string()
    }
}

/// Inbound payload schema; every field optional so validation happens in one place
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default)]
    id: Option<WireScalar>,
    #[serde(default)]
    sender_id: Option<WireScalar>,
    #[serde(default)]
    sender_name: Option<String>,
    #[serde(default)]
    sender_email: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    room_id: Option<WireScalar>,
    #[serde(default)]
    chat_room_id: Option<WireScalar>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    message_type: Option<String>,
}

/// Serialize an outbound message for a SEND frame body
pub fn encode_message(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Decode a MESSAGE frame body
pub fn decode_message(body: &str) -> Result<ChatMessage, ParseError> {
    let wire: WireMessage = serde_json::from_str(body)?;
    let (room_id, field) = resolve_room_id(&wire)?;
    tracing::trace!("room id {} read from '{}'", room_id, field.name());

    let timestamp = match wire.timestamp {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => {
            tracing::debug!("ignoring non-string timestamp: {}", other);
            None
        }
        None => None,
    };

    Ok(ChatMessage {
        id: wire.id.map(WireScalar::into_string),
        sender_id: wire.sender_id.as_ref().and_then(WireScalar::as_i64),
        sender_name: wire.sender_name.unwrap_or_default(),
        sender_email: wire.sender_email.unwrap_or_default(),
        content: wire.content.unwrap_or_default(),
        room_id,
        timestamp,
        message_type: wire.message_type,
    })
}

/// Apply the room id rule.
///
/// A field that is missing, null, zero or negative counts as absent and the
/// next field is tried. A present value that is not an integer is an error.
fn resolve_room_id(wire: &WireMessage) -> Result<(RoomId, RoomIdField), ParseError> {
    for field in RoomIdField::PRECEDENCE {
        let Some(value) = field.value(wire) else {
            continue;
        };
        match value.as_i64() {
            Some(n) if n <= 0 => continue,
            Some(n) => {
                let id = RoomId::try_from(n)?;
                return Ok((id, field));
            }
            None => return Err(InvalidRoomId(value.raw()).into()),
        }
    }
    Err(ParseError::MissingRoomId)
}
