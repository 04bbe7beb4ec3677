use super::reconcile::Tracked;
use crate::ack::AckRegistry;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::protocol::{
    self, room_ack_key, AuthAck, AuthenticateRequest, ChannelAck, ChannelRequest,
    CustomEventAck, CustomEventRequest, RoomAck, RoomAction, RoomRequest, AUTHENTICATE, AUTHENTICATED,
    CUSTOM_EVENT, CUSTOM_EVENT_RESULT, PING, ROOM_RESULT, SUBSCRIBE, SUBSCRIPTION_RESULT,
    UNSUBSCRIBE, UNSUBSCRIPTION_RESULT,
};
use crate::state::ConnectionState;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use pushsockets::{Connector, TransportHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One opened transport and the task pumping its events
pub(super) struct Link {
    pub(super) id: u64,
    pub(super) transport: Arc<dyn TransportHandle>,
    pub(super) driver: JoinHandle<()>,
}

/// How an acknowledged membership operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Acknowledged with success and applied to the state
    Applied,
    /// The server answered and refused
    Rejected,
    /// Not sent, unanswered, malformed, or overtaken by a reconnect
    Failed,
}

impl Outcome {
    pub(crate) fn succeeded(self) -> bool {
        self == Outcome::Applied
    }
}

/// Reconciliation bookkeeping: auto-auth epoch and per-name attempts
#[derive(Default)]
pub(super) struct Attempts {
    pub(super) authenticate: Option<u64>,
    pub(super) channels: Tracked,
    pub(super) rooms: Tracked,
}

/// Shared session internals
///
/// The manager, its driver task and reconciliation tasks all hold this.
/// `state` is only ever replaced wholesale under its write lock; `epoch` is
/// bumped under that same lock whenever the transport connects or goes away.
pub(crate) struct SessionCore {
    pub(super) config: SessionConfig,
    pub(super) connector: Arc<dyn Connector>,
    pub(super) state: RwLock<ConnectionState>,
    pub(super) link: Mutex<Option<Link>>,
    /// Id of the link whose events may still change state (0 = none)
    pub(super) active_link: AtomicU64,
    pub(super) next_link_id: AtomicU64,
    pub(super) epoch: AtomicU64,
    /// Namespace sid of the current connection
    pub(super) sid: Mutex<Option<String>>,
    pub(super) attempts: Mutex<Attempts>,
    pub(super) acks: AckRegistry,
    events_tx: Sender<SessionEvent>,
    pub(super) events_rx: Receiver<SessionEvent>,
}

impl SessionCore {
    pub(super) fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            connector,
            state: RwLock::new(ConnectionState::default()),
            link: Mutex::new(None),
            active_link: AtomicU64::new(0),
            next_link_id: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
            sid: Mutex::new(None),
            attempts: Mutex::new(Attempts::default()),
            acks: AckRegistry::new(),
            events_tx,
            events_rx,
        }
    }

    pub(super) fn publish(&self, event: SessionEvent) {
        // The core owns a receiver, so the channel never disconnects
        let _ = self.events_tx.send(event);
    }

    pub(super) fn report(&self, error: SessionError) {
        warn!(error = %error, "Session error");
        self.publish(SessionEvent::Error(error));
    }

    pub(super) fn snapshot(&self) -> ConnectionState {
        self.state.read().clone()
    }

    pub(super) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Apply `next` if the connection `epoch` is still the live one
    pub(super) fn transition(
        &self,
        epoch: u64,
        next: impl FnOnce(&ConnectionState) -> ConnectionState,
    ) -> bool {
        let mut state = self.state.write();
        if !state.is_connected || self.epoch.load(Ordering::Acquire) != epoch {
            debug!(epoch, "Connection changed while awaiting acknowledgment, result discarded");
            return false;
        }
        *state = next(&state);
        true
    }

    fn transport(&self) -> Option<Arc<dyn TransportHandle>> {
        self.link.lock().as_ref().map(|link| Arc::clone(&link.transport))
    }

    /// Transport and epoch, if the session is connected (and authenticated when required)
    fn ready(&self, require_auth: bool) -> Option<(Arc<dyn TransportHandle>, u64)> {
        let epoch = {
            let state = self.state.read();
            if !state.is_connected || (require_auth && !state.is_authenticated) {
                return None;
            }
            self.current_epoch()
        };
        self.transport().map(|transport| (transport, epoch))
    }

    fn encode<T: Serialize>(&self, event: &str, payload: &T) -> Option<Value> {
        protocol::encode(event, payload)
            .map_err(|e| self.report(e))
            .ok()
    }

    fn decode<T: DeserializeOwned>(&self, event: &str, data: Value) -> Option<T> {
        protocol::decode(event, Some(data))
            .map_err(|e| self.report(e))
            .ok()
    }

    /// Emit `operation` and race its `result_event` against the ack timeout
    ///
    /// Returns the epoch the request was sent in and the acknowledgment
    /// payload; `None` when nothing could be sent or no answer arrived in time.
    async fn request(
        &self,
        operation: &str,
        result_event: &str,
        key: Option<&str>,
        payload: Value,
        require_auth: bool,
    ) -> Option<(u64, Value)> {
        let Some((transport, epoch)) = self.ready(require_auth) else {
            debug!(operation, "Not ready, nothing sent");
            return None;
        };

        let waiter = self.acks.register(result_event, key);
        if let Err(e) = transport.emit(operation, Some(payload)) {
            self.report(e.into());
            return None;
        }
        debug!(operation, key, "Request sent");

        match waiter.wait(self.config.ack_timeout()).await {
            Some(data) => Some((epoch, data)),
            None => {
                debug!(operation, key, "No acknowledgment within {:?}", self.config.ack_timeout());
                None
            }
        }
    }

    pub(crate) async fn authenticate(self: &Arc<Self>, user_id: &str, session_id: &str) -> bool {
        let Some(payload) = self.encode(
            AUTHENTICATE,
            &AuthenticateRequest {
                user_id,
                session_id,
            },
        ) else {
            return false;
        };
        let Some((epoch, data)) = self
            .request(AUTHENTICATE, AUTHENTICATED, None, payload, false)
            .await
        else {
            return false;
        };
        let Some(ack) = self.decode::<AuthAck>(AUTHENTICATED, data) else {
            return false;
        };
        if !ack.success {
            self.report(SessionError::rejected(AUTHENTICATE, ack.error));
            return false;
        }

        let Some(connection_id) = ack.connection_id.or_else(|| self.sid.lock().clone()) else {
            self.report(SessionError::malformed(AUTHENTICATED, "missing connectionId"));
            return false;
        };
        let applied = self.transition(epoch, |state| {
            state.authenticated(
                connection_id.clone(),
                user_id.to_string(),
                session_id.to_string(),
            )
        });
        if !applied {
            return false;
        }

        info!(user_id, connection_id = %connection_id, "Authenticated");
        self.publish(SessionEvent::Authenticated { connection_id });
        self.reconcile();
        true
    }

    pub(crate) async fn subscribe(self: &Arc<Self>, channel: &str) -> Outcome {
        self.channel_request(SUBSCRIBE, SUBSCRIPTION_RESULT, channel).await
    }

    pub(crate) async fn unsubscribe(self: &Arc<Self>, channel: &str) -> Outcome {
        self.channel_request(UNSUBSCRIBE, UNSUBSCRIPTION_RESULT, channel).await
    }

    async fn channel_request(self: &Arc<Self>, operation: &str, result_event: &str, channel: &str) -> Outcome {
        let Some(payload) = self.encode(operation, &ChannelRequest { channel_name: channel }) else {
            return Outcome::Failed;
        };
        let Some((epoch, data)) = self
            .request(operation, result_event, Some(channel), payload, true)
            .await
        else {
            return Outcome::Failed;
        };
        let Some(ack) = self.decode::<ChannelAck>(result_event, data) else {
            return Outcome::Failed;
        };
        if ack.channel_name.as_deref().map_or(false, |name| name != channel) {
            warn!(channel, got = ?ack.channel_name, "Acknowledgment for a different channel");
            return Outcome::Failed;
        }
        if !ack.success {
            self.report(SessionError::rejected(operation, ack.error));
            return Outcome::Rejected;
        }

        let subscribing = operation == SUBSCRIBE;
        let applied = self.transition(epoch, |state| {
            if subscribing {
                state.with_channel(channel)
            } else {
                state.without_channel(channel)
            }
        });
        if !applied {
            return Outcome::Failed;
        }

        info!(channel, "{}", if subscribing { "Subscribed" } else { "Unsubscribed" });
        self.reconcile();
        Outcome::Applied
    }

    pub(crate) async fn room(self: &Arc<Self>, room: &str, action: RoomAction) -> Outcome {
        let operation = action.request_event();
        let Some(payload) = self.encode(operation, &RoomRequest { room_name: room }) else {
            return Outcome::Failed;
        };
        let key = room_ack_key(room, action.as_str());
        let Some((epoch, data)) = self
            .request(operation, ROOM_RESULT, Some(key.as_str()), payload, true)
            .await
        else {
            return Outcome::Failed;
        };
        let Some(ack) = self.decode::<RoomAck>(ROOM_RESULT, data) else {
            return Outcome::Failed;
        };
        if ack.room_name.as_deref().map_or(false, |name| name != room) {
            warn!(room, got = ?ack.room_name, "Acknowledgment for a different room");
            return Outcome::Failed;
        }
        if !ack.success {
            self.report(SessionError::rejected(operation, ack.error));
            return Outcome::Rejected;
        }
        if ack.action.as_deref() != Some(action.as_str()) {
            warn!(
                room,
                expected = action.as_str(),
                got = ?ack.action,
                "Room acknowledgment for a different action"
            );
            return Outcome::Rejected;
        }

        let applied = self.transition(epoch, |state| match action {
            RoomAction::Join => state.with_room(room),
            RoomAction::Leave => state.without_room(room),
        });
        if !applied {
            return Outcome::Failed;
        }

        info!(room, action = action.as_str(), "Room membership changed");
        self.reconcile();
        Outcome::Applied
    }

    pub(crate) async fn send_event(&self, event: &Value, target: Option<&str>) -> bool {
        let Some(payload) = self.encode(CUSTOM_EVENT, &CustomEventRequest { event, target }) else {
            return false;
        };
        let Some((_, data)) = self
            .request(CUSTOM_EVENT, CUSTOM_EVENT_RESULT, None, payload, true)
            .await
        else {
            return false;
        };
        let Some(ack) = self.decode::<CustomEventAck>(CUSTOM_EVENT_RESULT, data) else {
            return false;
        };
        if !ack.success {
            self.report(SessionError::rejected(CUSTOM_EVENT, ack.error));
            return false;
        }
        true
    }

    pub(crate) fn ping(&self) {
        let Some(transport) = self.transport() else {
            debug!("Ping skipped, no transport");
            return;
        };
        if let Err(e) = transport.emit(PING, None) {
            debug!(error = %e, "Ping not sent");
        }
    }
}
