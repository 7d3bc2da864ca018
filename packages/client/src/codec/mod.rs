//! Wire codecs.
//!
//! - `stomp`: STOMP 1.2 frame encoding and decoding
//! - `message`: JSON payloads carried in SEND / MESSAGE frame bodies

pub mod message;
pub mod stomp;

pub use message::{OutboundMessage, RoomIdField, decode_message, encode_message};
pub use stomp::{Command, Frame};
