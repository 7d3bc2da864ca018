//! Message formatting utilities for client display.

use chrono::{DateTime, FixedOffset};
use hiroma_shared::time::to_broker_rfc3339;

use crate::domain::{ChatMessage, MessageKind, RoomId};

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format an incoming message
    ///
    /// # Arguments
    ///
    /// * `message` - The routed message
    /// * `my_email` - The current user's email (to mark own messages as "me")
    /// * `received_at` - Fallback time when the message carries no usable timestamp
    ///
    /// # Returns
    ///
    /// A formatted string; enter / leave notices are rendered as one-liners
    pub fn format_message(
        message: &ChatMessage,
        my_email: &str,
        received_at: DateTime<FixedOffset>,
    ) -> String {
        let at = to_broker_rfc3339(message.sent_at().unwrap_or(received_at));
        let who = if message.sender_email == my_email {
            format!("{} (me)", message.sender_name)
        } else {
            message.sender_name.clone()
        };

        match message.kind() {
            MessageKind::Enter => format!("\n+ [{}] {} entered at {}\n", message.room_id, who, at),
            MessageKind::Leave => format!("\n- [{}] {} left at {}\n", message.room_id, who, at),
            MessageKind::Chat | MessageKind::Other(_) => format!(
                "\n\n------------------------------------------------------------\n\
                 [{}] @{}: {}\n\
                 sent at {}\n\
                 ------------------------------------------------------------\n",
                message.room_id, who, message.content, at
            ),
        }
    }

    /// Format the list of subscribed rooms, marking the current one
    pub fn format_room_list(rooms: &[RoomId], current: Option<RoomId>) -> String {
        let mut output = String::new();
        output.push_str("\n============================================================\n");
        output.push_str("Subscribed rooms:\n");

        if rooms.is_empty() {
            output.push_str("(No rooms)\n");
        } else {
            for room in rooms {
                let marker = if Some(*room) == current { " (current)" } else { "" };
                output.push_str(&format!("#{}{}\n", room, marker));
            }
        }

        output.push_str("============================================================\n");
        output
    }

    /// Format a confirmation after queueing a message
    pub fn format_sent_confirmation(room_id: RoomId, sent_at: DateTime<FixedOffset>) -> String {
        format!("queued for #{} at {}\n", room_id, to_broker_rfc3339(sent_at))
    }
}
