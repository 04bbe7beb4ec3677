//! Transport event pump
//!
//! One driver task per opened transport. It applies transport events to the
//! session serially, in arrival order, and stops on its own once the
//! transport has finished and dropped its end of the channel.

use super::session::SessionCore;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::protocol::{
    self, room_ack_key, Pong, RealtimeEvent, RoomAction, AUTHENTICATED, CUSTOM_EVENT_RESULT, PONG, REALTIME_EVENT,
    ROOM_RESULT, SUBSCRIPTION_RESULT, UNSUBSCRIPTION_RESULT,
};
use pushsockets::TransportEvent;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

pub(super) async fn run_driver(
    core: Weak<SessionCore>,
    link_id: u64,
    mut events: UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(core) = core.upgrade() else {
            debug!("Session dropped, driver exiting");
            return;
        };
        core.handle_transport_event(link_id, event);
    }

    if let Some(core) = core.upgrade() {
        core.transport_finished(link_id);
    }
}

impl SessionCore {
    fn is_active(&self, link_id: u64) -> bool {
        self.active_link.load(Ordering::Acquire) == link_id
    }

    pub(super) fn handle_transport_event(self: &Arc<Self>, link_id: u64, event: TransportEvent) {
        if !self.is_active(link_id) {
            debug!(link_id, ?event, "Event from a torn-down transport ignored");
            return;
        }

        match event {
            TransportEvent::Connected { sid } => {
                {
                    let mut state = self.state.write();
                    if !self.is_active(link_id) {
                        return;
                    }
                    self.epoch.fetch_add(1, Ordering::AcqRel);
                    *state = state.connected();
                }
                info!(sid = %sid, "Realtime transport connected");
                *self.sid.lock() = Some(sid);
                self.publish(SessionEvent::Connected);
            }
            TransportEvent::Disconnected { reason } => {
                self.reset_connection(link_id);
                info!(reason = %reason, "Realtime transport disconnected");
                self.publish(SessionEvent::Disconnected { reason });
            }
            TransportEvent::Reconnecting { attempt } => {
                info!(attempt, "Realtime transport reconnecting");
                self.publish(SessionEvent::Reconnecting { attempt });
            }
            TransportEvent::ReconnectFailed { attempts } => {
                self.reset_connection(link_id);
                self.report(SessionError::Transport(format!(
                    "reconnection failed after {} attempts",
                    attempts
                )));
            }
            TransportEvent::Message { event, data } => self.dispatch(&event, data),
            TransportEvent::Error(message) => self.report(SessionError::Transport(message)),
        }

        self.reconcile();
    }

    /// Route an inbound named event
    fn dispatch(&self, event: &str, data: Option<Value>) {
        match event {
            AUTHENTICATED | CUSTOM_EVENT_RESULT => self.acknowledge(event, None, data),
            SUBSCRIPTION_RESULT | UNSUBSCRIPTION_RESULT => {
                let key = name_field(&data, "channelName");
                self.acknowledge(event, key, data);
            }
            ROOM_RESULT => self.acknowledge_room(data),
            REALTIME_EVENT => match protocol::decode::<RealtimeEvent>(event, data) {
                Ok(realtime) => self.publish(SessionEvent::Realtime(realtime)),
                Err(e) => self.report(e),
            },
            PONG => match protocol::decode::<Pong>(event, data) {
                Ok(pong) => self.publish(SessionEvent::Pong {
                    timestamp: pong.timestamp,
                }),
                Err(e) => self.report(e),
            },
            other => debug!(event = other, "Unhandled server event"),
        }
    }

    fn acknowledge(&self, event: &str, key: Option<String>, data: Option<Value>) {
        if !self.acks.resolve(event, key.as_deref(), ack_payload(data)) {
            debug!(event, key = ?key, "Late or unsolicited acknowledgment ignored");
        }
    }

    /// A room result goes to the operation expecting its action, else to
    /// any operation on the same room, which then sees the mismatch
    fn acknowledge_room(&self, data: Option<Value>) {
        let Some(room) = name_field(&data, "roomName") else {
            return self.acknowledge(ROOM_RESULT, None, data);
        };
        let payload = ack_payload(data);

        if let Some(action) = payload.get("action").and_then(Value::as_str) {
            let exact = room_ack_key(&room, action);
            if self.acks.resolve(ROOM_RESULT, Some(exact.as_str()), payload.clone()) {
                return;
            }
        }

        let join = room_ack_key(&room, RoomAction::Join.as_str());
        let leave = room_ack_key(&room, RoomAction::Leave.as_str());
        if !self.acks.resolve_any(ROOM_RESULT, &[join.as_str(), leave.as_str()], payload) {
            debug!(room = %room, "Late or unsolicited room acknowledgment ignored");
        }
    }

    /// Disconnect reset for the given link, if it is still the live one
    fn reset_connection(&self, link_id: u64) {
        let mut state = self.state.write();
        if !self.is_active(link_id) {
            return;
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
        *state = state.disconnected();
        *self.sid.lock() = None;
    }

    /// The transport stopped for good (server disconnect or reconnection exhausted)
    pub(super) fn transport_finished(&self, link_id: u64) {
        let mut link = self.link.lock();
        if link.as_ref().map(|l| l.id) != Some(link_id) {
            return;
        }
        warn!("Realtime transport stopped; call connect() to open a new one");
        self.reset_connection(link_id);
        self.active_link.store(0, Ordering::Release);
        link.take();
    }
}

fn ack_payload(data: Option<Value>) -> Value {
    data.unwrap_or_else(|| Value::Object(Default::default()))
}

fn name_field(data: &Option<Value>, field: &str) -> Option<String> {
    data.as_ref()
        .and_then(|d| d.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
}
