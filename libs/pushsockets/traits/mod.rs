//! # PushSockets Traits
//!
//! Core traits and types shared by the transport and its consumers:
//!
//! - **ReconnectionStrategy**: Control reconnection behavior
//! - **Connector / TransportHandle**: The seam between a session and its socket
//! - **TransportEvent**: What a transport reports back

pub mod error;
pub mod reconnect;
pub mod transport;

pub use error::{Result, SocketError};
pub use reconnect::{FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{Connector, EventSink, TransportEvent, TransportHandle};
