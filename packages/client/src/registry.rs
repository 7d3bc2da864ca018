//! Handler Registry: which rooms are currently of interest, and who receives them.

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::domain::{ChatMessage, RoomId};

/// Callback invoked with every message routed to its room
pub type MessageHandler = Arc<dyn Fn(ChatMessage) + Send + Sync>;

/// Room id → handler, at most one handler per room.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<RoomId, MessageHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaced (last write wins)
    pub fn insert(&mut self, room_id: RoomId, handler: MessageHandler) -> Option<MessageHandler> {
        self.handlers.insert(room_id, handler)
    }

    pub fn remove(&mut self, room_id: RoomId) -> Option<MessageHandler> {
        self.handlers.remove(&room_id)
    }

    /// Clone of the handler for a room.
    ///
    /// Dispatch invokes the returned handler after releasing the registry, so
    /// the handler is free to mutate the registry.
    pub fn get(&self, room_id: RoomId) -> Option<MessageHandler> {
        self.handlers.get(&room_id).cloned()
    }

    pub fn contains(&self, room_id: RoomId) -> bool {
        self.handlers.contains_key(&room_id)
    }

    /// Registered room ids in ascending order
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every handler, returning how many there were
    pub fn clear(&mut self) -> usize {
        let count = self.handlers.len();
        self.handlers.clear();
        count
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("rooms", &self.room_ids())
            .finish()
    }
}
