//! Connection Manager: lifecycle of the single broker connection.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──CONNECTED──▶ Connected
//!  ▲                    │                         │
//!  └──── Error / Closed ◀───── failure / close ───┘
//! ```
//!
//! Error and Closed are transient: they are published to state observers
//! and immediately followed by Idle. Every connection attempt gets a new
//! epoch so that late events from a torn-down socket are ignored.

use std::{fmt, time::Duration};

use tokio::sync::{mpsc, watch};

use crate::{
    codec::{Command, Frame},
    config::ClientConfig,
    error::{ConnectError, ProtocolError, TransportError},
    transport::{Link, TransportEvent, TransportSession},
};

const STOMP_VERSION: &str = "1.2";
const DEFAULT_REJECT_MESSAGE: &str = "STOMP connection error";

/// Lifecycle state of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Error,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Heart-beat intervals agreed at CONNECTED; `None` means disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat {
    /// How often this client must send something
    pub outgoing: Option<Duration>,
    /// How often the broker promised to send something
    pub incoming: Option<Duration>,
}

impl Heartbeat {
    /// Negotiate per STOMP 1.2: the larger of the two sides wins, zero on either side disables.
    ///
    /// `server_header` is the CONNECTED frame's `heart-beat:sx,sy` value.
    pub fn negotiate(client_out: Duration, client_in: Duration, server_header: Option<&str>) -> Self {
        let (sx, sy) = server_header
            .and_then(|h| h.split_once(','))
            .and_then(|(sx, sy)| Some((sx.trim().parse::<u64>().ok()?, sy.trim().parse::<u64>().ok()?)))
            .unwrap_or((0, 0));

        let pick = |ours: Duration, theirs_ms: u64| {
            if ours.is_zero() || theirs_ms == 0 {
                None
            } else {
                Some(ours.max(Duration::from_millis(theirs_ms)))
            }
        };

        Self {
            outgoing: pick(client_out, sy),
            incoming: pick(client_in, sx),
        }
    }

    /// Silence after which the broker is considered gone
    pub fn silence_limit(&self) -> Option<Duration> {
        self.incoming.map(|d| d * 2)
    }
}

/// Owns the connection state and the link of the live connection.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    link: Option<Link>,
    identity: Option<String>,
    epoch: u64,
    state_tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            state: ConnectionState::Idle,
            link: None,
            identity: None,
            epoch: 0,
            state_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Link of the current connection, present from socket open until teardown
    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    /// Identity the current connection was opened with
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Whether `epoch` still names the live connection attempt
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.state != ConnectionState::Idle
    }

    /// Idle → Connecting; returns the epoch of the new attempt
    pub fn begin_connect(&mut self, identity: &str) -> Result<u64, ConnectError> {
        if self.state != ConnectionState::Idle {
            return Err(ConnectError::AlreadyActive(self.state));
        }
        self.epoch += 1;
        self.identity = Some(identity.to_string());
        self.transition(ConnectionState::Connecting);
        Ok(self.epoch)
    }

    /// Record the opened socket; still Connecting until the handshake completes
    pub fn attach(&mut self, epoch: u64, link: Link) -> Result<(), ConnectError> {
        if !self.is_current(epoch) || self.state != ConnectionState::Connecting {
            link.close();
            return Err(ConnectError::Aborted);
        }
        self.link = Some(link);
        Ok(())
    }

    /// Connecting → Connected
    pub fn complete_connect(&mut self, epoch: u64) -> Result<(), ConnectError> {
        if !self.is_current(epoch) || self.state != ConnectionState::Connecting {
            return Err(ConnectError::Aborted);
        }
        self.transition(ConnectionState::Connected);
        Ok(())
    }

    /// Pass through `terminal` (Error or Closed) to Idle, handing back the link to close
    pub fn reset(&mut self, terminal: ConnectionState) -> Option<Link> {
        if self.state != ConnectionState::Idle {
            self.transition(terminal);
            self.transition(ConnectionState::Idle);
        }
        self.identity = None;
        self.link.take()
    }

    /// Caller-initiated teardown; a no-op when already Idle
    pub fn disconnect(&mut self) -> Option<Link> {
        if self.state == ConnectionState::Idle && self.link.is_none() {
            return None;
        }
        // Invalidate the in-flight attempt, if any
        self.epoch += 1;
        self.identity = None;
        self.transition(ConnectionState::Idle);
        self.link.take()
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::debug!("connection state: {} -> {}", self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
    }
}

/// Perform the STOMP CONNECT / CONNECTED exchange on a freshly opened session.
///
/// The identity travels as a CONNECT header; the broker binds the session to it.
pub async fn handshake(
    session: &mut TransportSession,
    identity: &str,
    config: &ClientConfig,
) -> Result<Heartbeat, ConnectError> {
    let connect = Frame::new(Command::Connect)
        .header("accept-version", STOMP_VERSION)
        .header("host", config.host_header())
        .header(
            "heart-beat",
            format!(
                "{},{}",
                config.heartbeat_outgoing.as_millis(),
                config.heartbeat_incoming.as_millis()
            ),
        )
        .header(config.identity_header.as_str(), identity);
    session.link.submit(connect)?;

    let connected = tokio::time::timeout(config.connect_timeout, await_connected(&mut session.events))
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))??;

    let heartbeat = Heartbeat::negotiate(
        config.heartbeat_outgoing,
        config.heartbeat_incoming,
        connected.get_header("heart-beat"),
    );
    tracing::debug!(
        "STOMP session established (version {}, heart-beat {:?})",
        connected.get_header("version").unwrap_or(STOMP_VERSION),
        heartbeat
    );
    Ok(heartbeat)
}

async fn await_connected(
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
) -> Result<Frame, ConnectError> {
    loop {
        match events.recv().await {
            Some(TransportEvent::Frame(frame)) => match frame.command {
                Command::Connected => return Ok(frame),
                Command::Error => {
                    let message = frame
                        .get_header("message")
                        .unwrap_or(DEFAULT_REJECT_MESSAGE)
                        .to_string();
                    return Err(ProtocolError::Rejected {
                        message,
                        details: frame.body,
                    }
                    .into());
                }
                other => return Err(ProtocolError::UnexpectedFrame(other.to_string()).into()),
            },
            Some(TransportEvent::Heartbeat) => continue,
            Some(TransportEvent::Closed(reason)) => return Err(TransportError::Closed(reason).into()),
            Some(TransportEvent::Failed(e)) => return Err(e.into()),
            None => return Err(TransportError::Closed(None).into()),
        }
    }
}

/// Send heart-beats on `link` every `interval` until the link goes inactive
pub(crate) fn spawn_heartbeat(link: Link, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !link.is_active() || link.heartbeat().is_err() {
                break;
            }
        }
        tracing::trace!("heart-beat ticker stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, Transport, testing::channel_session};

    fn test_config() -> ClientConfig {
        ClientConfig::default()
            .with_endpoint("ws://broker.test:8080/chat/websocket")
            .with_connect_timeout(Duration::from_millis(200))
    }

    #[test]
    fn test_heartbeat_negotiation_takes_larger_interval() {
        // テスト項目: ハートビート間隔は双方の大きい方に合わせられる
        // given (前提条件):
        let ours = Duration::from_millis(4000);

        // when (操作):
        let hb = Heartbeat::negotiate(ours, ours, Some("10000,1000"));

        // then (期待する結果):
        assert_eq!(hb.outgoing, Some(Duration::from_millis(4000)));
        assert_eq!(hb.incoming, Some(Duration::from_millis(10000)));
        assert_eq!(hb.silence_limit(), Some(Duration::from_millis(20000)));
    }

    #[test]
    fn test_heartbeat_negotiation_zero_disables() {
        // テスト項目: どちらかが 0 ならハートビートは無効になる
        // given (前提条件):
        let ours = Duration::from_millis(4000);

        // when (操作):
        let hb = Heartbeat::negotiate(ours, Duration::ZERO, Some("0,5000"));
        let missing = Heartbeat::negotiate(ours, ours, None);

        // then (期待する結果):
        assert_eq!(hb.outgoing, Some(Duration::from_millis(5000)));
        assert_eq!(hb.incoming, None);
        assert_eq!(missing, Heartbeat::default());
    }

    #[test]
    fn test_connect_only_valid_from_idle() {
        // テスト項目: Idle 以外からの接続開始は拒否される
        // given (前提条件):
        let mut manager = ConnectionManager::new();
        manager.begin_connect("u@x.com").unwrap();

        // when (操作):
        let result = manager.begin_connect("u@x.com");

        // then (期待する結果):
        assert_eq!(result, Err(ConnectError::AlreadyActive(ConnectionState::Connecting)));
    }

    #[test]
    fn test_reset_publishes_terminal_state_then_idle() {
        // テスト項目: 失敗時は Error を経由して Idle に戻り、観測者に通知される
        // given (前提条件):
        let mut manager = ConnectionManager::new();
        let mut watcher = manager.watch();
        let epoch = manager.begin_connect("u@x.com").unwrap();
        let (session, _broker) = channel_session();
        manager.attach(epoch, session.link).unwrap();

        // when (操作):
        let link = manager.reset(ConnectionState::Error);

        // then (期待する結果):
        assert!(link.is_some());
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert!(manager.identity().is_none());
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), ConnectionState::Idle);
    }

    #[test]
    fn test_disconnect_invalidates_pending_attempt() {
        // テスト項目: 接続中に切断すると、その接続試行は完了できなくなる
        // given (前提条件):
        let mut manager = ConnectionManager::new();
        let epoch = manager.begin_connect("u@x.com").unwrap();

        // when (操作):
        manager.disconnect();
        let result = manager.complete_connect(epoch);

        // then (期待する結果):
        assert_eq!(result, Err(ConnectError::Aborted));
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_disconnect_when_idle_is_noop() {
        // テスト項目: Idle での切断は何もしない
        // given (前提条件):
        let mut manager = ConnectionManager::new();

        // when (操作):
        let first = manager.disconnect();
        let second = manager.disconnect();

        // then (期待する結果):
        assert!(first.is_none());
        assert!(second.is_none());
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_handshake_sends_identity_and_negotiates() {
        // テスト項目: CONNECT にアイデンティティが付与され、CONNECTED でハートビートが決まる
        // given (前提条件):
        let (session, mut broker) = channel_session();
        let mut transport = MockTransport::new();
        transport.expect_open().return_once(move || Ok(session));
        let mut session = transport.open().await.unwrap();
        broker.deliver(
            Frame::new(Command::Connected)
                .header("version", "1.2")
                .header("heart-beat", "4000,4000"),
        );

        // when (操作):
        let result = handshake(&mut session, "u@x.com", &test_config()).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Ok(Heartbeat {
                outgoing: Some(Duration::from_millis(4000)),
                incoming: Some(Duration::from_millis(4000)),
            })
        );
        let connect = broker.next_frame().unwrap();
        assert_eq!(connect.command, Command::Connect);
        assert_eq!(connect.get_header("user-email"), Some("u@x.com"));
        assert_eq!(connect.get_header("accept-version"), Some("1.2"));
        assert_eq!(connect.get_header("host"), Some("broker.test"));
        assert_eq!(connect.get_header("heart-beat"), Some("4000,4000"));
    }

    #[tokio::test]
    async fn test_handshake_error_frame_is_protocol_error() {
        // テスト項目: ERROR フレームは ProtocolError::Rejected になる
        // given (前提条件):
        let (mut session, broker) = channel_session();
        broker.deliver(
            Frame::new(Command::Error)
                .header("message", "unknown user")
                .with_body("user-email not registered"),
        );

        // when (操作):
        let result = handshake(&mut session, "ghost@x.com", &test_config()).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ConnectError::Protocol(ProtocolError::Rejected {
                message: "unknown user".to_string(),
                details: "user-email not registered".to_string(),
            }))
        );
    }

    #[tokio::test]
    async fn test_handshake_error_frame_without_message_header() {
        // テスト項目: message ヘッダーが無い ERROR フレームは既定のメッセージになる
        // given (前提条件):
        let (mut session, broker) = channel_session();
        broker.deliver(Frame::new(Command::Error));

        // when (操作):
        let result = handshake(&mut session, "u@x.com", &test_config()).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ConnectError::Protocol(ProtocolError::Rejected { ref message, .. }))
                if message == "STOMP connection error"
        ));
    }

    #[tokio::test]
    async fn test_handshake_socket_closed_is_transport_error() {
        // テスト項目: ハンドシェイク中の切断は TransportError になる
        // given (前提条件):
        let (mut session, broker) = channel_session();
        broker.hang_up();

        // when (操作):
        let result = handshake(&mut session, "u@x.com", &test_config()).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ConnectError::Transport(TransportError::Closed(Some(
                "server shutdown".to_string()
            ))))
        );
    }

    #[tokio::test]
    async fn test_handshake_times_out() {
        // テスト項目: CONNECTED が返らない場合はタイムアウトする
        // given (前提条件):
        let (mut session, _broker) = channel_session();

        // when (操作):
        let result = handshake(&mut session, "u@x.com", &test_config()).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ConnectError::Transport(TransportError::Timeout(
                Duration::from_millis(200)
            )))
        );
    }

    #[tokio::test]
    async fn test_handshake_unexpected_frame() {
        // テスト項目: CONNECTED 以外のフレームは UnexpectedFrame になる
        // given (前提条件):
        let (mut session, broker) = channel_session();
        broker.deliver(Frame::new(Command::Message));

        // when (操作):
        let result = handshake(&mut session, "u@x.com", &test_config()).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ConnectError::Protocol(ProtocolError::UnexpectedFrame(
                "MESSAGE".to_string()
            )))
        );
    }
}
