//! Parsing of interactive input lines.

use crate::domain::RoomId;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    /// `/join <room>`: subscribe and make it the current room
    Join(RoomId),
    /// `/leave <room>`
    Leave(RoomId),
    /// `/to <room>`: change the room plain lines are sent to
    Switch(RoomId),
    /// `/rooms`
    Rooms,
    /// `/quit`
    Quit,
    /// Any other line: chat text for the current room
    Say(String),
    /// A slash command that could not be understood
    Invalid(String),
}

impl InputCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return InputCommand::Say(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();

        let room = || arg.and_then(|a| a.parse::<RoomId>().ok());
        let parsed = match name {
            "join" => room().map(InputCommand::Join),
            "leave" => room().map(InputCommand::Leave),
            "to" => room().map(InputCommand::Switch),
            "rooms" => Some(InputCommand::Rooms),
            "quit" | "exit" => Some(InputCommand::Quit),
            _ => None,
        };
        parsed.unwrap_or_else(|| InputCommand::Invalid(line.to_string()))
    }
}
