//! # PushSockets
//!
//! A small Socket.IO client transport built on tokio-tungstenite.
//!
//! ## Features
//!
//! - **WebSocket-only Engine.IO v4**: no long-polling fallback, no upgrade dance
//! - **Server heartbeat**: pings answered immediately, silent links declared dead
//! - **Fixed reconnection policy**: attempt count and delay set once at creation
//! - **Named events**: `emit(event, payload)` out, `TransportEvent::Message` in
//! - **Pluggable seam**: sessions depend on `Connector`, not on the socket

pub mod core;
pub mod traits;

pub use traits::*;

pub use core::{
    client, codec, config, connection_state,
    client::{SocketIoClient, WebSocketConnector},
    config::{socket_io_endpoint, TransportConfig},
    connection_state::{AtomicTransportState, TransportState},
};
