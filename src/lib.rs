//! Coffee Selection realtime client - Main Library
//!
//! This crate ties the realtime workspace together for binaries.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (config paths)
//! - **logging**: tracing subscriber setup
//! - **shutdown**: Ctrl+C handling
//! - **realtime**: Session manager (re-exported from workspace)
//! - **pushsockets**: Socket.IO transport (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use coffee_realtime::bin_common::{load_config_from_env, ConfigType};
//! use coffee_realtime::realtime::{RealtimeSessionManager, SessionConfig};
//! ```

// Re-export workspace libraries for convenience
pub use pushsockets;
pub use realtime;

pub mod logging;
pub mod shutdown;

pub use logging::init_tracing;
pub use shutdown::ShutdownManager;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;

    pub use cli::{load_config_from_env, load_session_config, parse_args, ConfigType};
}
