//! Room identity.

use std::{fmt, num::NonZeroU64, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ChatMessage;

/// Room identifier is not a positive integer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("room id must be a positive integer, got '{0}'")]
pub struct InvalidRoomId(pub String);

/// Positive integer identifying a chat room.
///
/// Every routing decision is keyed by this value, so string and numeric
/// representations seen on the wire are reconciled into it before lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct RoomId(NonZeroU64);

impl RoomId {
    /// Create a room id, rejecting zero
    pub fn new(value: u64) -> Result<Self, InvalidRoomId> {
        NonZeroU64::new(value)
            .map(Self)
            .ok_or_else(|| InvalidRoomId(value.to_string()))
    }

    /// Numeric value of the id
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl TryFrom<u64> for RoomId {
    type Error = InvalidRoomId;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i64> for RoomId {
    type Error = InvalidRoomId;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .map_err(|_| InvalidRoomId(value.to_string()))
            .and_then(Self::new)
    }
}

impl FromStr for RoomId {
    type Err = InvalidRoomId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map_err(|_| InvalidRoomId(s.to_string()))
            .and_then(Self::new)
    }
}

impl From<RoomId> for u64 {
    fn from(id: RoomId) -> Self {
        id.get()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation as known to the realtime layer.
///
/// The authoritative room list lives behind the REST room directory; this
/// type mirrors its JSON so callers can hand room metadata around, but only
/// `id` matters for routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: RoomId,
    pub name: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<ChatMessage>,
}
