//! Domain types routed by the realtime transport.
//!
//! These types are wire-agnostic: the codec maps broker payloads onto them
//! and back.

mod message;
mod room;

pub use message::{ChatMessage, InvalidSenderId, MessageKind, OutgoingMessage, SenderId};
pub use room::{ChatRoom, InvalidRoomId, RoomId};
