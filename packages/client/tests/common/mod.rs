//! In-process STOMP broker for integration tests.
//!
//! Speaks just enough STOMP 1.2 over an axum WebSocket to stand in for the
//! chat broker: CONNECT / SUBSCRIBE / UNSUBSCRIBE / SEND / DISCONNECT, with
//! every SEND body fanned out as a MESSAGE to all subscribers of the topic.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::{net::TcpListener, sync::broadcast};

use hiroma_client::{
    ClientConfig,
    codec::stomp::{Command, Frame, decode, encode, is_heartbeat},
    config::{DEFAULT_BROADCAST_TOPIC, DEFAULT_IDENTITY_HEADER},
};

/// Identity the broker refuses with an ERROR frame
pub const REJECTED_IDENTITY: &str = "banned@example.com";

struct BrokerState {
    fanout: broadcast::Sender<String>,
    hang_up: broadcast::Sender<()>,
    sends: Mutex<Vec<(String, String)>>,
    subscribes: Mutex<Vec<String>>,
}

/// A broker listening on an ephemeral localhost port
pub struct MockBroker {
    addr: std::net::SocketAddr,
    state: Arc<BrokerState>,
}

impl MockBroker {
    pub async fn start() -> Self {
        let (fanout, _) = broadcast::channel(64);
        let (hang_up, _) = broadcast::channel(4);
        let state = Arc::new(BrokerState {
            fanout,
            hang_up,
            sends: Mutex::new(Vec::new()),
            subscribes: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/chat/websocket", get(websocket_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock broker");
        let addr = listener.local_addr().expect("Failed to read local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        MockBroker { addr, state }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/chat/websocket", self.addr)
    }

    /// Client config pointed at this broker, with heart-beats off
    pub fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_endpoint(self.url())
            .with_heartbeat(Duration::ZERO, Duration::ZERO)
            .with_connect_timeout(Duration::from_secs(5))
    }

    /// Close every open connection from the broker side
    pub fn hang_up(&self) {
        let _ = self.state.hang_up.send(());
    }

    /// `(destination, body)` of every SEND received so far
    pub fn sends(&self) -> Vec<(String, String)> {
        self.state.sends.lock().unwrap().clone()
    }

    /// Destinations of every SUBSCRIBE received so far
    pub fn subscribes(&self) -> Vec<String> {
        self.state.subscribes.lock().unwrap().clone()
    }
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BrokerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<BrokerState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut fanout = state.fanout.subscribe();
    let mut hang_up = state.hang_up.subscribe();
    let mut subscriptions: Vec<(String, String)> = Vec::new();
    let mut message_seq = 0u64;

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(Message::Text(text))) = incoming else {
                    break;
                };
                if is_heartbeat(text.as_str()) {
                    continue;
                }
                let Ok(frame) = decode(text.as_str()) else {
                    break;
                };

                match frame.command {
                    Command::Connect | Command::Stomp => {
                        let identity = frame.get_header(DEFAULT_IDENTITY_HEADER).unwrap_or_default();
                        if identity == REJECTED_IDENTITY {
                            let error = Frame::new(Command::Error)
                                .header("message", "access denied")
                                .with_body("unknown user");
                            let _ = sender.send(Message::Text(encode(&error).into())).await;
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                        let connected = Frame::new(Command::Connected)
                            .header("version", "1.2")
                            .header("heart-beat", "0,0");
                        if sender.send(Message::Text(encode(&connected).into())).await.is_err() {
                            break;
                        }
                    }
                    Command::Subscribe => {
                        let id = frame.get_header("id").unwrap_or_default().to_string();
                        let destination = frame.get_header("destination").unwrap_or_default().to_string();
                        state.subscribes.lock().unwrap().push(destination.clone());
                        subscriptions.push((id, destination));
                    }
                    Command::Unsubscribe => {
                        let id = frame.get_header("id").unwrap_or_default();
                        subscriptions.retain(|(sub, _)| sub != id);
                    }
                    Command::Send => {
                        let destination = frame.get_header("destination").unwrap_or_default().to_string();
                        state.sends.lock().unwrap().push((destination, frame.body.clone()));
                        let _ = state.fanout.send(frame.body);
                    }
                    Command::Disconnect => break,
                    _ => {}
                }
            }
            body = fanout.recv() => {
                let Ok(body) = body else {
                    break;
                };
                for (id, destination) in &subscriptions {
                    if destination != DEFAULT_BROADCAST_TOPIC {
                        continue;
                    }
                    message_seq += 1;
                    let message = Frame::new(Command::Message)
                        .header("destination", destination.as_str())
                        .header("subscription", id.as_str())
                        .header("message-id", message_seq.to_string())
                        .header("content-type", "application/json")
                        .with_body(body.clone());
                    if sender.send(Message::Text(encode(&message).into())).await.is_err() {
                        return;
                    }
                }
            }
            _ = hang_up.recv() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
