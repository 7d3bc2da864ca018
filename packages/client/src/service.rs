//! The realtime service: one broker connection shared by many room consumers.
//!
//! A [`RealtimeService`] is constructed by the application and cloned into
//! whichever components need it; there is no global instance. All state lives
//! behind one lock that is never held across an await point or while a
//! message handler runs.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::sync::{mpsc, watch};

use crate::{
    codec::{Command, Frame},
    config::ClientConfig,
    connection::{ConnectionManager, ConnectionState, handshake, spawn_heartbeat},
    domain::{ChatMessage, OutgoingMessage, RoomId},
    error::{ConnectError, SendError, SubscribeError, TransportError},
    multiplexer::Multiplexer,
    publisher,
    transport::{Transport, TransportEvent, WebSocketTransport},
};

/// Diagnostic view of the subscription state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    /// Id of the open broadcast subscription, if any
    pub broadcast_id: Option<String>,
    /// Rooms with a registered handler, ascending
    pub rooms: Vec<RoomId>,
}

impl SubscriptionSnapshot {
    /// Number of open transport subscriptions (0 or 1)
    pub fn open_subscriptions(&self) -> usize {
        usize::from(self.broadcast_id.is_some())
    }
}

#[derive(Debug)]
struct Core {
    connection: ConnectionManager,
    multiplexer: Multiplexer,
}

impl Core {
    /// Tear down after a failure or unsolicited close, if `epoch` is still live
    fn fail(&mut self, epoch: u64, terminal: ConnectionState) {
        if !self.connection.is_current(epoch) {
            return;
        }
        let dropped = self.multiplexer.teardown(None);
        if let Some(link) = self.connection.reset(terminal) {
            link.close();
        }
        if dropped > 0 {
            tracing::info!("Dropped {} room handlers; re-subscribe after reconnecting", dropped);
        }
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        // Last handle gone without disconnect: stop the writer and heart-beat ticker
        if let Some(link) = self.connection.link() {
            link.close();
        }
    }
}

fn lock(core: &Mutex<Core>) -> MutexGuard<'_, Core> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client-side realtime messaging transport
#[derive(Clone)]
pub struct RealtimeService {
    core: Arc<Mutex<Core>>,
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
}

impl RealtimeService {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let core = Core {
            connection: ConnectionManager::new(),
            multiplexer: Multiplexer::new(config.broadcast_topic.clone()),
        };
        Self {
            core: Arc::new(Mutex::new(core)),
            transport,
            config: Arc::new(config),
        }
    }

    /// Service talking to `config.endpoint` over WebSocket
    pub fn with_websocket(config: ClientConfig) -> Self {
        let transport = Arc::new(WebSocketTransport::new(config.endpoint.clone()));
        Self::new(config, transport)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the connection and perform the STOMP handshake with `identity` as credential.
    ///
    /// Only valid while Idle. On failure the state returns to Idle and the
    /// error is handed back; nothing is retried.
    pub async fn connect(&self, identity: &str) -> Result<(), ConnectError> {
        let epoch = lock(&self.core).connection.begin_connect(identity)?;
        tracing::info!("Connecting to {} as '{}'", self.config.endpoint, identity);

        let mut session = match self.transport.open().await {
            Ok(session) => session,
            Err(e) => return Err(self.abandon(epoch, e.into())),
        };
        lock(&self.core).connection.attach(epoch, session.link.clone())?;

        let heartbeat = match handshake(&mut session, identity, &self.config).await {
            Ok(heartbeat) => heartbeat,
            Err(e) => {
                session.link.close();
                return Err(self.abandon(epoch, e));
            }
        };
        lock(&self.core).connection.complete_connect(epoch)?;

        if let Some(interval) = heartbeat.outgoing {
            spawn_heartbeat(session.link.clone(), interval);
        }
        tokio::spawn(pump(
            Arc::downgrade(&self.core),
            session.events,
            epoch,
            heartbeat.silence_limit(),
        ));

        tracing::info!("Connected to {}", self.config.endpoint);
        Ok(())
    }

    /// Settle a failed attempt. A `disconnect` that raced the attempt wins, so
    /// whatever the socket reported afterwards surfaces as `Aborted`.
    fn abandon(&self, epoch: u64, error: ConnectError) -> ConnectError {
        let mut core = lock(&self.core);
        if !core.connection.is_current(epoch) {
            tracing::info!("Connection attempt aborted ({})", error);
            return ConnectError::Aborted;
        }
        tracing::error!("Failed to connect to {}: {}", self.config.endpoint, error);
        core.fail(epoch, ConnectionState::Error);
        error
    }

    /// Tear down the broadcast subscription, forget every handler, close the
    /// connection. Safe to call in any state, any number of times.
    pub fn disconnect(&self) {
        let mut guard = lock(&self.core);
        let core = &mut *guard;

        let link = core.connection.link().cloned();
        let dropped = core.multiplexer.teardown(link.as_ref());
        let was_live = core.connection.state() != ConnectionState::Idle;
        core.connection.disconnect();

        if let Some(link) = link {
            if link.is_active() {
                let _ = link.submit(Frame::new(Command::Disconnect));
            }
            link.close();
        }
        if was_live {
            tracing::info!("Disconnected ({} room handlers cleared)", dropped);
        }
    }

    /// Deliver messages for `room_id` to `handler`, replacing any earlier handler.
    ///
    /// The first subscription opens the shared broadcast subscription; later
    /// ones only touch the registry. Returns whether a handler was replaced.
    pub fn subscribe<F>(&self, room_id: RoomId, handler: F) -> Result<bool, SubscribeError>
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        let mut guard = lock(&self.core);
        let core = &mut *guard;
        let link = publisher::ensure_ready(&core.connection)?;
        Ok(core.multiplexer.subscribe(link, room_id, Arc::new(handler))?)
    }

    /// Stop delivering messages for `room_id`. Returns whether a handler was removed.
    pub fn unsubscribe(&self, room_id: RoomId) -> bool {
        let mut guard = lock(&self.core);
        let core = &mut *guard;
        core.multiplexer.unsubscribe(core.connection.link(), room_id)
    }

    /// Publish a message to `room_id`. Fails fast when the connection is not usable.
    pub fn send(&self, room_id: RoomId, message: OutgoingMessage) -> Result<(), SendError> {
        let core = lock(&self.core);
        publisher::publish(
            &core.connection,
            &self.config.publish_destination,
            room_id,
            message,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.core).connection.state()
    }

    /// Receiver that observes every state transition
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        lock(&self.core).connection.watch()
    }

    /// Whether a handler is registered for `room_id`
    pub fn is_subscribed(&self, room_id: RoomId) -> bool {
        lock(&self.core).multiplexer.is_subscribed(room_id)
    }

    pub fn subscribed_room_ids(&self) -> Vec<RoomId> {
        lock(&self.core).multiplexer.room_ids()
    }

    pub fn subscriptions(&self) -> SubscriptionSnapshot {
        let core = lock(&self.core);
        SubscriptionSnapshot {
            broadcast_id: core.multiplexer.broadcast().map(|b| b.id.clone()),
            rooms: core.multiplexer.room_ids(),
        }
    }
}

/// Dispatch loop of one connection.
///
/// Frames are handled strictly in arrival order. Handlers run with the lock
/// released, so they may call back into the service.
async fn pump(
    core: Weak<Mutex<Core>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    epoch: u64,
    silence_limit: Option<Duration>,
) {
    loop {
        let event = match silence_limit {
            Some(limit) => match tokio::time::timeout(limit, events.recv()).await {
                Ok(event) => event,
                Err(_) => Some(TransportEvent::Failed(TransportError::HeartbeatTimeout(limit))),
            },
            None => events.recv().await,
        };
        let Some(shared) = core.upgrade() else {
            break;
        };

        let delivery = {
            let mut guard = lock(&shared);
            if !guard.connection.is_current(epoch) {
                tracing::debug!("Dispatch loop for stale connection exiting");
                break;
            }
            match event {
                Some(TransportEvent::Frame(frame)) if frame.command == Command::Error => {
                    tracing::error!(
                        "Broker error: {} {}",
                        frame.get_header("message").unwrap_or_default(),
                        frame.body
                    );
                    guard.fail(epoch, ConnectionState::Error);
                    break;
                }
                Some(TransportEvent::Frame(frame)) => {
                    if guard.connection.state() == ConnectionState::Connected {
                        guard.multiplexer.route(&frame)
                    } else {
                        None
                    }
                }
                Some(TransportEvent::Heartbeat) => {
                    tracing::trace!("<<< heart-beat");
                    None
                }
                Some(TransportEvent::Closed(reason)) => {
                    tracing::warn!("Connection closed by broker: {}", reason.unwrap_or_default());
                    guard.fail(epoch, ConnectionState::Closed);
                    break;
                }
                Some(TransportEvent::Failed(e)) => {
                    tracing::error!("Connection lost: {}", e);
                    guard.fail(epoch, ConnectionState::Error);
                    break;
                }
                None => {
                    tracing::warn!("Transport event stream ended");
                    guard.fail(epoch, ConnectionState::Closed);
                    break;
                }
            }
        };

        if let Some((handler, message)) = delivery {
            handler(message);
        }
    }
}
