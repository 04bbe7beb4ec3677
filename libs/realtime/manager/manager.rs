use super::driver::run_driver;
use super::session::{Link, SessionCore};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::protocol::RoomAction;
use crate::state::{ConnectionState, Status};
use crossbeam_channel::Receiver;
use pushsockets::{Connector, WebSocketConnector};
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Reason reported when the owner closes the session
const CLIENT_DISCONNECT: &str = "io client disconnect";

/// One logical realtime connection to the push server
///
/// Owns the transport, the connection/authentication/membership state and
/// the stream of [`SessionEvent`]s. Operations that expect a server answer
/// resolve to `bool`: `true` only for an explicit success acknowledged within
/// the ack timeout. Failures are terminal for that call only; details are
/// published on the event stream.
///
/// Dropping the manager disconnects it.
///
/// # Example
/// ```ignore
/// let config = SessionConfig::from_env()
///     .with_identity("u1", "s1")
///     .auto_authenticate(true)
///     .with_channels(["promo", "orders"]);
///
/// let session = RealtimeSessionManager::from_config(config)?;
/// session.connect();
///
/// while let Ok(event) = session.events().recv() {
///     if let SessionEvent::Realtime(push) = event {
///         println!("{:?}", push.event);
///     }
/// }
/// ```
pub struct RealtimeSessionManager {
    core: Arc<SessionCore>,
}

impl RealtimeSessionManager {
    /// Create a session on top of `connector`; connects right away if
    /// `auto_connect` is set
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let auto_connect = config.auto_connect;
        let manager = Self {
            core: Arc::new(SessionCore::new(config, connector)),
        };
        if auto_connect {
            manager.connect();
        }
        manager
    }

    /// Create a session over the Socket.IO WebSocket transport
    pub fn from_config(config: SessionConfig) -> pushsockets::Result<Self> {
        let connector = WebSocketConnector::new(config.transport_config()?);
        Ok(Self::new(config, Arc::new(connector)))
    }

    /// Open the transport if none exists
    ///
    /// The connection attempt starts immediately; its outcome shows up in
    /// the state and on the event stream. Must be called within a Tokio
    /// runtime.
    pub fn connect(&self) {
        let core = &self.core;
        let mut link = core.link.lock();
        if link.is_some() {
            debug!("Transport already open");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                core.report(SessionError::Transport(
                    "a Tokio runtime is required to connect".into(),
                ));
                return;
            }
        };

        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = match core.connector.open(events_tx) {
            Ok(transport) => transport,
            Err(e) => {
                core.report(e.into());
                return;
            }
        };

        let id = core.next_link_id.fetch_add(1, Ordering::AcqRel);
        core.active_link.store(id, Ordering::Release);
        let driver = runtime.spawn(run_driver(Arc::downgrade(core), id, events_rx));
        *link = Some(Link {
            id,
            transport: Arc::from(transport),
            driver,
        });
        info!(url = %core.config.url, "Realtime session connecting");
    }

    /// Close the transport and reset the state. Idempotent.
    ///
    /// In-flight operations are not cancelled; they time out to `false`.
    pub fn disconnect(&self) {
        let core = &self.core;
        let link = core.link.lock().take();

        let was_connected = {
            let mut state = core.state.write();
            core.active_link.store(0, Ordering::Release);
            let was_connected = state.is_connected;
            if link.is_some() || was_connected {
                core.epoch.fetch_add(1, Ordering::AcqRel);
            }
            *state = state.disconnected();
            was_connected
        };
        *core.sid.lock() = None;

        if let Some(link) = link {
            link.driver.abort();
            link.transport.close();
            info!("Realtime session disconnected");
        }
        if was_connected {
            core.publish(SessionEvent::Disconnected {
                reason: CLIENT_DISCONNECT.to_string(),
            });
        }
    }

    /// Identify this connection to the server
    ///
    /// `false` without sending anything when not connected.
    pub async fn authenticate(&self, user_id: &str, session_id: &str) -> bool {
        self.core.authenticate(user_id, session_id).await
    }

    /// Subscribe to a channel; requires an authenticated session
    pub async fn subscribe(&self, channel: &str) -> bool {
        self.core.subscribe(channel).await.succeeded()
    }

    /// Unsubscribe from a channel; `true` even if it was not subscribed
    pub async fn unsubscribe(&self, channel: &str) -> bool {
        self.core.unsubscribe(channel).await.succeeded()
    }

    /// Join a room; the server must acknowledge with `action: "joined"`
    pub async fn join_room(&self, room: &str) -> bool {
        self.core.room(room, RoomAction::Join).await.succeeded()
    }

    /// Leave a room; the server must acknowledge with `action: "left"`
    pub async fn leave_room(&self, room: &str) -> bool {
        self.core.room(room, RoomAction::Leave).await.succeeded()
    }

    /// Send an application event, optionally addressed to a target
    pub async fn send_event(&self, event: &Value, target: Option<&str>) -> bool {
        self.core.send_event(event, target).await
    }

    /// `send_event` addressed to a channel
    pub async fn broadcast_event(&self, event: &Value, channel: &str) -> bool {
        self.send_event(event, Some(channel)).await
    }

    /// Fire-and-forget keepalive; the answer arrives as `SessionEvent::Pong`
    pub fn ping(&self) {
        self.core.ping();
    }

    pub fn get_status(&self) -> Status {
        self.core.state.read().status()
    }

    /// Snapshot of the full state record
    pub fn state(&self) -> ConnectionState {
        self.core.snapshot()
    }

    /// Receiver for session events
    ///
    /// All receivers share one queue: each event goes to exactly one of them.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.core.events_rx.clone()
    }

    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        self.core.events_rx.try_recv().ok()
    }

    /// Blocking receive with a timeout, for synchronous consumers
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        self.core.events_rx.recv_timeout(timeout).ok()
    }

    /// Number of operations currently awaiting an acknowledgment
    pub fn pending_acknowledgments(&self) -> usize {
        self.core.acks.pending()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }
}

impl Drop for RealtimeSessionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}
