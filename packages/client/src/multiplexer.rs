//! Subscription Multiplexer.
//!
//! The broker fans every room's messages out on one broadcast topic, so this
//! client holds exactly one subscription to it and demultiplexes by the room
//! id inside each payload:
//!
//! ```text
//! MESSAGE frame ─▶ subscription check ─▶ decode ─▶ registry lookup ─▶ handler
//! ```
//!
//! The broadcast subscription is open if and only if the registry is
//! non-empty. Nothing in the routing path propagates an error: a frame that
//! cannot be routed is logged and dropped so other rooms keep receiving.

use crate::{
    codec::{Command, Frame, decode_message},
    domain::{ChatMessage, RoomId},
    error::{ParseError, TransportError},
    registry::{HandlerRegistry, MessageHandler},
    transport::Link,
};

/// The one open subscription to the broadcast topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSubscription {
    pub id: String,
    pub destination: String,
}

#[derive(Debug)]
pub struct Multiplexer {
    registry: HandlerRegistry,
    broadcast: Option<BroadcastSubscription>,
    topic: String,
    next_subscription: u64,
}

impl Multiplexer {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            broadcast: None,
            topic: topic.into(),
            next_subscription: 0,
        }
    }

    /// Register `handler` for `room_id`, opening the broadcast subscription if
    /// this is the first room. Returns whether an earlier handler was replaced.
    pub fn subscribe(
        &mut self,
        link: &Link,
        room_id: RoomId,
        handler: MessageHandler,
    ) -> Result<bool, TransportError> {
        if self.broadcast.is_none() {
            let id = format!("sub-{}", self.next_subscription);
            link.submit(
                Frame::new(Command::Subscribe)
                    .header("id", id.as_str())
                    .header("destination", self.topic.as_str())
                    .header("ack", "auto"),
            )?;
            self.next_subscription += 1;
            tracing::info!("Opened broadcast subscription '{}' on {}", id, self.topic);
            self.broadcast = Some(BroadcastSubscription {
                id,
                destination: self.topic.clone(),
            });
        }

        let replaced = self.registry.insert(room_id, handler).is_some();
        if replaced {
            tracing::debug!("Replaced handler for room {}", room_id);
        } else {
            tracing::info!(
                "Subscribed to room {} ({} rooms registered)",
                room_id,
                self.registry.len()
            );
        }
        Ok(replaced)
    }

    /// Remove the handler for `room_id`; closes the broadcast subscription when
    /// the last room goes. Returns whether a handler was removed.
    pub fn unsubscribe(&mut self, link: Option<&Link>, room_id: RoomId) -> bool {
        let removed = self.registry.remove(room_id).is_some();
        if removed {
            tracing::info!("Unsubscribed from room {}", room_id);
        }
        if self.registry.is_empty() {
            self.close_broadcast(link);
        }
        removed
    }

    /// Drop every handler and the broadcast subscription. Returns how many rooms were dropped.
    pub fn teardown(&mut self, link: Option<&Link>) -> usize {
        let dropped = self.registry.clear();
        self.close_broadcast(link);
        dropped
    }

    /// Decide where an inbound frame goes.
    ///
    /// The handler comes back as a snapshot so the caller can invoke it after
    /// releasing whatever guards the multiplexer.
    pub fn route(&self, frame: &Frame) -> Option<(MessageHandler, ChatMessage)> {
        if frame.command != Command::Message {
            tracing::trace!("Ignoring {} frame", frame.command);
            return None;
        }

        let Some(broadcast) = &self.broadcast else {
            tracing::debug!("Dropping MESSAGE: no broadcast subscription is open");
            return None;
        };
        let ours = match frame.get_header("subscription") {
            Some(id) => id == broadcast.id,
            None => frame.get_header("destination") == Some(broadcast.destination.as_str()),
        };
        if !ours {
            tracing::debug!(
                "Dropping MESSAGE for stale subscription {:?}",
                frame.get_header("subscription")
            );
            return None;
        }

        let message = match decode_message(&frame.body) {
            Ok(message) => message,
            Err(ParseError::MissingRoomId) => {
                tracing::warn!("Dropping message without room id: {}", frame.body);
                return None;
            }
            Err(e) => {
                tracing::warn!("Dropping unparsable message: {} (body: {})", e, frame.body);
                return None;
            }
        };

        match self.registry.get(message.room_id) {
            Some(handler) => {
                tracing::debug!("Routing message to room {}", message.room_id);
                Some((handler, message))
            }
            None => {
                tracing::debug!(
                    "No handler for room {}; registered rooms: {:?}",
                    message.room_id,
                    self.registry.room_ids()
                );
                None
            }
        }
    }

    pub fn broadcast(&self) -> Option<&BroadcastSubscription> {
        self.broadcast.as_ref()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.registry.room_ids()
    }

    pub fn is_subscribed(&self, room_id: RoomId) -> bool {
        self.registry.contains(room_id)
    }

    fn close_broadcast(&mut self, link: Option<&Link>) {
        let Some(broadcast) = self.broadcast.take() else {
            return;
        };
        if let Some(link) = link.filter(|l| l.is_active()) {
            let unsubscribe = Frame::new(Command::Unsubscribe).header("id", broadcast.id.as_str());
            if let Err(e) = link.submit(unsubscribe) {
                tracing::debug!("Could not send UNSUBSCRIBE for '{}': {}", broadcast.id, e);
            }
        }
        tracing::info!("Closed broadcast subscription '{}'", broadcast.id);
    }
}
