//! Realtime chat transport.
//!
//! One STOMP-over-WebSocket connection to the chat broker, multiplexed into
//! any number of room conversations:
//!
//! ```text
//! inbound:  Transport → Multiplexer → codec → HandlerRegistry → handler
//! outbound: caller → Publisher → codec → Transport
//! ```
//!
//! [`RealtimeService`] is the entry point. It is an ordinary value owned by
//! the application; clone it to share.

pub mod cli;
pub mod codec;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod multiplexer;
pub mod publisher;
pub mod registry;
pub mod service;
pub mod transport;

pub use config::ClientConfig;
pub use connection::ConnectionState;
pub use domain::{ChatMessage, ChatRoom, MessageKind, OutgoingMessage, RoomId, SenderId};
pub use error::{
    ConnectError, NotConnectedError, ParseError, ProtocolError, SendError, SubscribeError,
    TransportError,
};
pub use service::{RealtimeService, SubscriptionSnapshot};
