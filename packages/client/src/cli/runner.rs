//! Client execution logic.
//!
//! There is no reconnection loop: when the broker goes away the session ends
//! with [`ClientError::ConnectionLost`] and the user restarts the client.

use hiroma_shared::time::{Clock, SystemClock};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

use super::{
    command::InputCommand, error::ClientError, formatter::MessageFormatter, ui::redisplay_prompt,
};
use crate::{
    config::ClientConfig,
    connection::ConnectionState,
    domain::{ChatMessage, OutgoingMessage, RoomId},
    service::RealtimeService,
};

/// Everything the interactive client needs to start
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub config: ClientConfig,
    /// Email used as the handshake credential and shown on messages
    pub identity: String,
    pub sender_id: i64,
    pub sender_name: String,
    /// Rooms to subscribe to right after connecting; the last one becomes current
    pub rooms: Vec<RoomId>,
}

/// Run one interactive session
pub async fn run_client(options: ClientOptions) -> Result<(), ClientError> {
    let service = RealtimeService::with_websocket(options.config.clone());
    service.connect(&options.identity).await?;
    tracing::info!("Session ready on {}", service.config().endpoint);
    let mut states = service.state_changes();

    println!(
        "\nYou are '{}'. Use /join <room>, /leave <room>, /to <room>, /rooms, /quit.\n",
        options.identity
    );

    let mut current: Option<RoomId> = None;
    for room in &options.rooms {
        join(&service, *room, &options.identity);
        current = Some(*room);
    }

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    spawn_readline(options.identity.clone(), input_tx);

    let result = loop {
        tokio::select! {
            line = input_rx.recv() => {
                let Some(line) = line else {
                    break Ok(());
                };
                match InputCommand::parse(&line) {
                    InputCommand::Join(room) => {
                        join(&service, room, &options.identity);
                        current = Some(room);
                    }
                    InputCommand::Leave(room) => {
                        if service.unsubscribe(room) {
                            println!("left #{}", room);
                        }
                        if current == Some(room) {
                            current = service.subscribed_room_ids().last().copied();
                        }
                    }
                    InputCommand::Switch(room) if service.is_subscribed(room) => current = Some(room),
                    InputCommand::Switch(room) => println!("Not in #{}; /join {} first", room, room),
                    InputCommand::Rooms => {
                        print!(
                            "{}",
                            MessageFormatter::format_room_list(&service.subscribed_room_ids(), current)
                        );
                    }
                    InputCommand::Quit => break Ok(()),
                    InputCommand::Say(text) if text.is_empty() => {}
                    InputCommand::Say(text) => match current {
                        Some(room) => say(&service, &options, room, text),
                        None => println!("Join a room first: /join <room>"),
                    },
                    InputCommand::Invalid(line) => println!("Unknown command: {}", line),
                }
            }
            changed = states.changed() => {
                if changed.is_err() || *states.borrow_and_update() == ConnectionState::Idle {
                    tracing::error!("Connection to the broker was lost");
                    break Err(ClientError::ConnectionLost);
                }
            }
        }
    };

    service.disconnect();
    result
}

fn join(service: &RealtimeService, room: RoomId, identity: &str) {
    let me = identity.to_string();
    let clock = SystemClock;
    let print = move |message: ChatMessage| {
        print!(
            "{}",
            MessageFormatter::format_message(&message, &me, clock.now())
        );
        redisplay_prompt(&me);
    };
    match service.subscribe(room, print) {
        Ok(_) => println!("joined #{}", room),
        Err(e) => tracing::error!("Could not join room {}: {}", room, e),
    }
}

fn say(service: &RealtimeService, options: &ClientOptions, room: RoomId, text: String) {
    let message = OutgoingMessage::new(
        options.sender_id,
        options.sender_name.as_str(),
        options.identity.as_str(),
        text,
    );
    match service.send(room, message) {
        Ok(()) => print!(
            "{}",
            MessageFormatter::format_sent_confirmation(room, SystemClock.now())
        ),
        Err(e) => tracing::warn!("Failed to send message: {}", e),
    }
}

/// Read lines on a blocking thread (rustyline is synchronous) and forward them
fn spawn_readline(label: String, input_tx: mpsc::UnboundedSender<String>) {
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", label);
        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line).ok();
                    if input_tx.send(line.to_string()).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });
}
