//! Publisher: validate connection readiness and emit SEND frames.
//!
//! Every message goes to one fixed broker destination regardless of room;
//! the room travels inside the payload. The broker echoes it back on the
//! broadcast topic, so senders also see their own messages through dispatch.

use crate::{
    codec::{Command, Frame, OutboundMessage, encode_message},
    connection::{ConnectionManager, ConnectionState},
    domain::{OutgoingMessage, RoomId},
    error::{NotConnectedError, SendError},
    transport::Link,
};

/// Check the connection preconditions in order, naming the first that fails
pub fn ensure_ready(connection: &ConnectionManager) -> Result<&Link, NotConnectedError> {
    let link = connection
        .link()
        .ok_or(NotConnectedError::NoActiveConnection)?;
    if connection.state() != ConnectionState::Connected {
        return Err(NotConnectedError::NotConnected);
    }
    if !link.is_active() {
        return Err(NotConnectedError::TransportInactive);
    }
    Ok(link)
}

/// Build the SEND frame for a message bound to `room_id`
pub fn build_frame(
    destination: &str,
    room_id: RoomId,
    message: OutgoingMessage,
) -> Result<Frame, SendError> {
    let dto = OutboundMessage::build(room_id, message)?;
    let body = encode_message(&dto)?;
    Ok(Frame::new(Command::Send)
        .header("destination", destination)
        .header("content-type", "application/json")
        .with_body(body))
}

/// Submit a message for transmission. Returns once the frame is queued.
pub fn publish(
    connection: &ConnectionManager,
    destination: &str,
    room_id: RoomId,
    message: OutgoingMessage,
) -> Result<(), SendError> {
    let link = ensure_ready(connection).inspect_err(|e| {
        tracing::warn!("Cannot send to room {}: {}", room_id, e);
    })?;
    let frame = build_frame(destination, room_id, message)?;
    link.submit(frame)?;
    tracing::debug!("Queued message for room {} to {}", room_id, destination);
    Ok(())
}
