//! Listen to the push server and log every session event
//!
//! Connects, authenticates when configured to, subscribes to the desired
//! channels and rooms, and keeps the link alive with periodic pings.
//!
//! Usage:
//!   cargo run --bin realtime_listen [extra-channel ...]
//!
//! Environment variables:
//!   REALTIME_URL         - push server base URL (default http://localhost:3001)
//!   REALTIME_CONFIG_PATH - YAML configuration (default config/realtime.yaml)
//!   RUST_LOG             - log filter (default info)

use anyhow::Result;
use coffee_realtime::bin_common::{load_session_config, parse_args, ConfigType};
use coffee_realtime::realtime::{RealtimeSessionManager, SessionEvent};
use coffee_realtime::{init_tracing, ShutdownManager};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PING_INTERVAL: Duration = Duration::from_secs(25);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let mut config = load_session_config(ConfigType::Realtime)?;
    for channel in parse_args() {
        if !config.channels.contains(&channel) {
            config.channels.push(channel);
        }
    }
    config.validate()?;
    config.log();

    let session = RealtimeSessionManager::from_config(config)?;
    session.connect();

    info!("Listening for realtime events, press Ctrl+C to stop");

    let mut last_ping = Instant::now();
    while shutdown.is_running() {
        while let Some(event) = session.try_recv_event() {
            log_event(&event);
        }

        if last_ping.elapsed() >= PING_INTERVAL {
            session.ping();
            last_ping = Instant::now();
        }

        sleep(POLL_INTERVAL).await;
    }

    session.disconnect();
    let state = session.state();
    info!(
        channels = state.channels.len(),
        rooms = state.rooms.len(),
        "Shutdown complete"
    );
    Ok(())
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Connected => info!("Connected"),
        SessionEvent::Disconnected { reason } => warn!(reason = %reason, "Disconnected"),
        SessionEvent::Reconnecting { attempt } => info!(attempt, "Reconnecting"),
        SessionEvent::Authenticated { connection_id } => {
            info!(connection_id = %connection_id, "Authenticated")
        }
        SessionEvent::Realtime(push) => info!(
            timestamp = ?push.timestamp,
            "Realtime event: {}",
            push.event
        ),
        SessionEvent::Pong { timestamp } => info!(timestamp = ?timestamp, "Pong"),
        SessionEvent::Error(e) => warn!(error = %e, "Session error"),
    }
}
