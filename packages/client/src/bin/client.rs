//! Interactive chat client over a STOMP broker.
//!
//! Connects once, subscribes to the given rooms over the shared connection and
//! sends stdin lines to the current room. Exits with a non-zero status when the
//! connection is lost.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroma-client -- -i alice@example.com --sender-id 1 --sender-name Alice --room 5
//! cargo run --bin hiroma-client -- -i bob@example.com --sender-id 2 --sender-name Bob -r 5 -r 7
//! ```

use clap::Parser;

use hiroma_client::{
    ClientConfig, RoomId,
    cli::{ClientOptions, run_client},
    config::DEFAULT_ENDPOINT,
};
use hiroma_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hiroma-client")]
#[command(about = "Realtime chat client multiplexing many rooms over one connection", long_about = None)]
struct Args {
    /// Email sent as the handshake credential
    #[arg(short = 'i', long)]
    identity: String,

    /// Numeric sender id put on outgoing messages
    #[arg(long)]
    sender_id: i64,

    /// Display name put on outgoing messages
    #[arg(long)]
    sender_name: String,

    /// Room to join on startup (repeatable)
    #[arg(short = 'r', long = "room")]
    rooms: Vec<RoomId>,

    /// Broker WebSocket URL
    #[arg(short = 'u', long, default_value = DEFAULT_ENDPOINT)]
    url: String,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let options = ClientOptions {
        config: ClientConfig::default().with_endpoint(args.url),
        identity: args.identity,
        sender_id: args.sender_id,
        sender_name: args.sender_name,
        rooms: args.rooms,
    };

    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
