//! WebSocket を使った Transport 実装
//!
//! ## 責務
//!
//! - tokio-tungstenite でブローカーに接続する
//! - 書き込みタスク: `Outbound` を STOMP テキストフレームに変換して送信
//! - 読み込みタスク: 受信テキストを STOMP フレームにデコードして `TransportEvent` に変換
//!
//! SockJS エンドポイントの場合は、生の WebSocket である `<endpoint>/websocket` を指定します。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::{Link, Outbound, Transport, TransportEvent, TransportSession, log_frame};
use crate::{codec::stomp, error::TransportError};

/// Opens STOMP sessions over a plain WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: String,
}

impl WebSocketTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self) -> Result<TransportSession, TransportError> {
        let (ws_stream, response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;
        tracing::debug!(
            "WebSocket opened to {} (HTTP {})",
            self.endpoint,
            response.status()
        );

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let active = Arc::new(AtomicBool::new(true));

        // Writer: drain the outbound queue into the socket
        let writer_active = active.clone();
        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                let result = match outbound {
                    Outbound::Frame(frame) => {
                        write.send(Message::Text(stomp::encode(&frame).into())).await
                    }
                    Outbound::Heartbeat => write.send(Message::Text("\n".into())).await,
                    Outbound::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    tracing::warn!("WebSocket write error: {}", e);
                    break;
                }
            }
            writer_active.store(false, Ordering::SeqCst);
            let _ = write.close().await;
        });

        // Reader: turn socket messages into transport events
        let reader_active = active.clone();
        tokio::spawn(async move {
            let last = loop {
                let event = match read.next().await {
                    Some(Ok(Message::Text(text))) => text_event(text.as_str()),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => text_event(text),
                        Err(e) => {
                            tracing::warn!("dropping non UTF-8 binary frame: {}", e);
                            None
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break TransportEvent::Closed(frame.map(|f| f.reason.to_string()));
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => break TransportEvent::Failed(TransportError::Io(e.to_string())),
                    None => break TransportEvent::Closed(None),
                };
                if let Some(event) = event
                    && event_tx.send(event).is_err()
                {
                    // Nobody is listening any more
                    break TransportEvent::Closed(None);
                }
            };
            reader_active.store(false, Ordering::SeqCst);
            let _ = event_tx.send(last);
        });

        Ok(TransportSession {
            link: Link::new(out_tx, active),
            events: event_rx,
        })
    }
}

/// Classify one text message; undecodable frames are logged and dropped
fn text_event(text: &str) -> Option<TransportEvent> {
    if stomp::is_heartbeat(text) {
        return Some(TransportEvent::Heartbeat);
    }
    match stomp::decode(text) {
        Ok(frame) => {
            log_frame("<<<", &frame);
            Some(TransportEvent::Frame(frame))
        }
        Err(e) => {
            tracing::warn!("dropping undecodable STOMP frame: {} ({:?})", e, text);
            None
        }
    }
}
