//! # Realtime session manager
//!
//! `RealtimeSessionManager` is the public handle. Internally a shared
//! `SessionCore` is driven from three places:
//!
//! - the owner's calls (`connect`, `authenticate`, `subscribe`, ...)
//! - one driver task per transport, applying `TransportEvent`s in order
//! - reconciliation tasks re-establishing identity and desired memberships

mod driver;
#[allow(clippy::module_inception)]
pub mod manager;
mod reconcile;
mod session;

pub use manager::RealtimeSessionManager;
