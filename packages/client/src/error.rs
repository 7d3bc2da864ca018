//! Error types for the realtime chat transport.

use std::time::Duration;

use thiserror::Error;

use crate::{
    connection::ConnectionState,
    domain::{InvalidRoomId, InvalidSenderId},
};

/// Socket-level failure, during connect or while connected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The WebSocket could not be opened
    #[error("failed to open transport: {0}")]
    Open(String),

    /// The socket failed while in use
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The peer closed the socket
    #[error("transport closed{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),

    /// The handshake did not complete in time
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// No frame or heart-beat arrived within the negotiated window
    #[error("no heart-beat from broker within {0:?}")]
    HeartbeatTimeout(Duration),

    /// The writer side of the link is gone
    #[error("outbound channel closed")]
    ChannelClosed,
}

/// A STOMP frame that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("malformed header line '{0}'")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header '{0}'")]
    InvalidEscape(String),

    #[error("frame is missing its NUL terminator")]
    Unterminated,

    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),
}

/// Handshake or framing failure reported by (or caused by) the broker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The broker answered with an ERROR frame
    #[error("broker rejected the session: {message}")]
    Rejected { message: String, details: String },

    /// A frame arrived that is not valid at this point of the session
    #[error("unexpected {0} frame")]
    UnexpectedFrame(String),

    /// A frame could not be decoded
    #[error("malformed frame: {0}")]
    Malformed(#[from] FrameError),
}

/// An operation was attempted while a connection precondition is unmet.
///
/// Each variant names the precondition that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotConnectedError {
    /// No connection object exists
    #[error("no active connection")]
    NoActiveConnection,

    /// A connection exists but has not reached the Connected state
    #[error("not connected")]
    NotConnected,

    /// The connection is Connected but the socket no longer reports itself active
    #[error("transport inactive")]
    TransportInactive,
}

/// Malformed inbound payload
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload is not a valid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload carries neither roomId nor chatRoomId")]
    MissingRoomId,

    #[error(transparent)]
    InvalidRoomId(#[from] InvalidRoomId),
}

/// Failure of `connect`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// `connect` is only valid from Idle
    #[error("connect called while {0}")]
    AlreadyActive(ConnectionState),

    /// `disconnect` was called while the handshake was in flight
    #[error("connection attempt aborted by disconnect")]
    Aborted,
}

/// Failure of `subscribe`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error(transparent)]
    NotConnected(#[from] NotConnectedError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of `send`
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    NotConnected(#[from] NotConnectedError),

    #[error(transparent)]
    InvalidSenderId(#[from] InvalidSenderId),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
