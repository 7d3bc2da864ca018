//! Client configuration.

use std::time::Duration;

/// Default broker endpoint (the raw WebSocket behind the SockJS `/chat` endpoint)
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/chat/websocket";
/// Destination every outbound message is published to
pub const DEFAULT_PUBLISH_DESTINATION: &str = "/pub/receiveMessage";
/// Topic the broker fans every room's messages out on
pub const DEFAULT_BROADCAST_TOPIC: &str = "/sub/receiveMessage";
/// CONNECT header carrying the identity credential
pub const DEFAULT_IDENTITY_HEADER: &str = "user-email";

const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(4000);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for one realtime service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket URL of the broker
    pub endpoint: String,
    /// Value of the STOMP `host` header; derived from the endpoint when `None`
    pub host: Option<String>,
    /// Header name the identity is sent under at CONNECT
    pub identity_header: String,
    /// Destination for SEND frames
    pub publish_destination: String,
    /// Destination of the shared broadcast subscription
    pub broadcast_topic: String,
    /// Interval this client promises to send heart-beats at (zero disables)
    pub heartbeat_outgoing: Duration,
    /// Interval this client wants to receive heart-beats at (zero disables)
    pub heartbeat_incoming: Duration,
    /// Upper bound on the CONNECT/CONNECTED exchange
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            host: None,
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            publish_destination: DEFAULT_PUBLISH_DESTINATION.to_string(),
            broadcast_topic: DEFAULT_BROADCAST_TOPIC.to_string(),
            heartbeat_outgoing: DEFAULT_HEARTBEAT,
            heartbeat_incoming: DEFAULT_HEARTBEAT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_heartbeat(mut self, outgoing: Duration, incoming: Duration) -> Self {
        self.heartbeat_outgoing = outgoing;
        self.heartbeat_incoming = incoming;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Host header value: the configured host, else the endpoint's authority without port
    pub fn host_header(&self) -> String {
        if let Some(host) = &self.host {
            return host.clone();
        }
        let without_scheme = self
            .endpoint
            .split_once("://")
            .map_or(self.endpoint.as_str(), |(_, rest)| rest);
        let authority = without_scheme.split('/').next().unwrap_or_default();
        authority
            .rsplit_once(':')
            .map_or(authority, |(host, _)| host)
            .to_string()
    }
}
