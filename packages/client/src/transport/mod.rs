//! Transport abstraction.
//!
//! ## 責務
//!
//! - ソケットの生成と、STOMP フレーム単位の送受信
//! - 送信は同期的（`Link::submit` はチャネルに積むだけ）、実際の書き込みは非同期タスクが行う
//!
//! ## 設計ノート
//!
//! STOMP のハンドシェイクは Connection Manager 側で行います。Transport は
//! フレームを運ぶだけなので、テストではチャネルだけの実装に差し替えられます。
//!
//! ## 実装
//!
//! - `websocket`: tokio-tungstenite を使った実装

pub mod websocket;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{codec::Frame, error::TransportError};

pub use websocket::WebSocketTransport;

/// Item queued for the socket writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    Heartbeat,
    Close,
}

/// Something that happened on the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A decoded STOMP frame
    Frame(Frame),
    /// An EOL-only heart-beat
    Heartbeat,
    /// The peer closed the socket
    Closed(Option<String>),
    /// The socket failed
    Failed(TransportError),
}

/// Writing half of an open transport.
///
/// Clones share the same socket and activity flag.
#[derive(Debug, Clone)]
pub struct Link {
    tx: mpsc::UnboundedSender<Outbound>,
    active: Arc<AtomicBool>,
}

impl Link {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>, active: Arc<AtomicBool>) -> Self {
        Self { tx, active }
    }

    /// Queue a frame for transmission; never suspends
    pub fn submit(&self, frame: Frame) -> Result<(), TransportError> {
        log_frame(">>>", &frame);
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::ChannelClosed)
    }

    pub fn heartbeat(&self) -> Result<(), TransportError> {
        self.tx
            .send(Outbound::Heartbeat)
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Mark inactive and ask the writer to close the socket
    pub fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Outbound::Close);
    }

    /// Whether the socket is still usable
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

/// An opened transport: the writing link plus the inbound event stream
#[derive(Debug)]
pub struct TransportSession {
    pub link: Link,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens sockets to the broker
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a fresh socket. No STOMP traffic has been exchanged yet.
    async fn open(&self) -> Result<TransportSession, TransportError>;
}

/// Frame logging: SEND / MESSAGE / SUBSCRIBE / ERROR at debug, the rest at trace
pub(crate) fn log_frame(direction: &str, frame: &crate::codec::Frame) {
    if frame.command.is_noteworthy() {
        tracing::debug!(
            "{} {} {:?} {}",
            direction,
            frame.command,
            frame.headers,
            frame.body
        );
    } else {
        tracing::trace!("{} {} {:?}", direction, frame.command, frame.headers);
    }
}
