//! # PushSockets core
//!
//! Socket.IO (Engine.IO v4) transport over a single WebSocket.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pushsockets::core::*;
//! use tokio::sync::mpsc::unbounded_channel;
//!
//! #[tokio::main]
//! async fn main() -> pushsockets::Result<()> {
//!     let config = TransportConfig::new("http://localhost:3001")?
//!         .reconnect_strategy(FixedDelay::new(Duration::from_secs(1), Some(5)));
//!
//!     let (events_tx, mut events_rx) = unbounded_channel();
//!     let client = SocketIoClient::spawn(config, events_tx)?;
//!
//!     while let Some(event) = events_rx.recv().await {
//!         if let TransportEvent::Connected { .. } = event {
//!             client.emit("ping", None)?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection_state;

pub use client::{SocketIoClient, WebSocketConnector};
pub use codec::{EnginePacket, OpenHandshake, SocketPacket};
pub use config::{socket_io_endpoint, TransportConfig};
pub use connection_state::{AtomicTransportState, TransportState};

pub use crate::traits::*;
