use crate::error::{Result, SocketError};
use crate::traits::{FixedDelay, ReconnectionStrategy};
use std::sync::Arc;
use std::time::Duration;

/// Path and query the Socket.IO server listens on for WebSocket-only clients
const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Configuration for a Socket.IO transport
///
/// The reconnection strategy is fixed at creation; the transport never
/// renegotiates it.
#[derive(Clone)]
pub struct TransportConfig {
    /// WebSocket endpoint (ws:// or wss://), already including the Socket.IO path
    pub(crate) url: String,

    /// Reconnection strategy applied to dropped links and failed attempts
    pub(crate) reconnect_strategy: Arc<dyn ReconnectionStrategy>,

    /// Upper bound for TCP connect plus Engine.IO and namespace handshakes
    pub(crate) handshake_timeout: Duration,
}

impl TransportConfig {
    /// Build a configuration from a server base URL
    ///
    /// `http(s)://host:port` is mapped to the Socket.IO WebSocket endpoint;
    /// `ws(s)://` URLs are used as given.
    pub fn new(server_url: &str) -> Result<Self> {
        Ok(Self {
            url: socket_io_endpoint(server_url)?,
            reconnect_strategy: Arc::new(FixedDelay::default()),
            handshake_timeout: Duration::from_secs(20),
        })
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Arc::new(strategy);
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("url", &self.url)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

/// Map a server URL to its Socket.IO WebSocket endpoint
pub fn socket_io_endpoint(server_url: &str) -> Result<String> {
    let trimmed = server_url.trim();
    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        return Ok(trimmed.to_string());
    }

    let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix("https://") {
        ("wss://", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        ("ws://", rest)
    } else {
        return Err(SocketError::Configuration(format!(
            "unsupported URL scheme in '{}'",
            server_url
        )));
    };

    let host = rest.trim_end_matches('/');
    if host.is_empty() {
        return Err(SocketError::Configuration(format!(
            "missing host in '{}'",
            server_url
        )));
    }

    Ok(format!("{}{}{}", scheme, host, SOCKET_IO_PATH))
}
