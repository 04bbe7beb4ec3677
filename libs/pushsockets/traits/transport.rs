//! Transport seam
//!
//! The session layer never talks to a socket directly. It asks a
//! [`Connector`] to open a transport, hands it an event sink, and from then
//! on only emits named events through the returned [`TransportHandle`].
//!
//! ```text
//! Session ──open(sink)──> Connector ──> TransportHandle (emit / close)
//!    ^                                        │
//!    └──────── TransportEvent (sink) ─────────┘
//! ```

use crate::error::Result;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

/// Events published by a transport, in the order the connection produced them
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Namespace connection acknowledged by the server
    Connected { sid: String },
    /// Link dropped or was closed
    Disconnected { reason: String },
    /// About to retry (1-indexed attempt number)
    Reconnecting { attempt: usize },
    /// Reconnection strategy exhausted, the transport has stopped
    ReconnectFailed { attempts: usize },
    /// Named event pushed by the server
    Message { event: String, data: Option<Value> },
    /// Transport-level error (refused connection, bad frame, ...)
    Error(String),
}

/// Sink a transport publishes its events to
pub type EventSink = UnboundedSender<TransportEvent>;

/// Handle to one live transport
pub trait TransportHandle: Send + Sync {
    /// Emit a named event with an optional payload
    ///
    /// Fails with `ConnectionClosed` when the link is not currently connected.
    fn emit(&self, event: &str, data: Option<Value>) -> Result<()>;

    /// Close the link and stop any reconnection. Idempotent.
    fn close(&self);

    /// Whether the link is currently connected
    fn is_connected(&self) -> bool;
}

/// Factory for transports
///
/// Called once per logical connection; the returned transport owns its own
/// reconnection policy.
pub trait Connector: Send + Sync {
    fn open(&self, events: EventSink) -> Result<Box<dyn TransportHandle>>;
}
