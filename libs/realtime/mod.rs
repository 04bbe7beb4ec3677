//! # Realtime
//!
//! Session layer for the storefront's push-messaging server, on top of the
//! `pushsockets` Socket.IO transport.
//!
//! ## Features
//!
//! - **Single state record**: connection, authentication, channels and rooms,
//!   replaced wholesale on every transition
//! - **Acknowledgment races**: every request waits for its result event with a
//!   deadline; losers clean up on drop
//! - **Reconciliation**: identity and desired channels/rooms re-established on
//!   every (re)connection
//! - **Typed event stream**: one crossbeam channel of [`SessionEvent`]s
//!
//! ## Example
//!
//! ```rust,ignore
//! use realtime::{RealtimeSessionManager, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = RealtimeSessionManager::from_config(SessionConfig::from_env())?;
//!     session.connect();
//!
//!     if session.authenticate("u1", "s1").await {
//!         session.subscribe("promo").await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod ack;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod protocol;
pub mod state;

pub use ack::{AckRegistry, AckWaiter};
pub use config::{ConfigError, SessionConfig};
pub use error::SessionError;
pub use events::SessionEvent;
pub use manager::RealtimeSessionManager;
pub use protocol::{Pong, RealtimeEvent, RoomAction};
pub use state::{ConnectionState, Status};
