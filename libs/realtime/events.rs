use crate::error::SessionError;
use crate::protocol::RealtimeEvent;
use chrono::{DateTime, Utc};

/// Everything a session reports to its owner, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport connected (initially or after a reconnect)
    Connected,
    /// Transport dropped or was closed
    Disconnected { reason: String },
    /// Transport is retrying (1-indexed attempt)
    Reconnecting { attempt: usize },
    /// Server accepted the identity handshake
    Authenticated { connection_id: String },
    /// Unsolicited push event
    Realtime(RealtimeEvent),
    /// Answer to `ping()`
    Pong { timestamp: Option<DateTime<Utc>> },
    /// Transport failure, rejected request or malformed payload
    Error(SessionError),
}

impl SessionEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, SessionEvent::Error(_))
    }
}
