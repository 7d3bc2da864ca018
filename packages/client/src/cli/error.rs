//! Error types for the command-line client.

use thiserror::Error;

use crate::error::ConnectError;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The initial connection failed
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// The broker went away; the client does not reconnect on its own
    #[error("Connection lost")]
    ConnectionLost,
}
