use thiserror::Error;

/// Main error type for pushsockets
#[derive(Error, Debug)]
pub enum SocketError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed unexpectedly, or no connection is open
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Engine.IO / Socket.IO handshake did not complete
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Frame could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Reconnection failed
    #[error("Reconnection failed after {attempts} attempts: {reason}")]
    ReconnectionFailed { attempts: usize, reason: String },

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

/// Result type for pushsockets operations
pub type Result<T> = std::result::Result<T, SocketError>;
