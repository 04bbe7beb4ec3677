//! Level-triggered reconciliation
//!
//! Compares the configured identity and desired channel/room sets with the
//! current state and issues whatever is missing. Runs after every transport
//! event and every successful state change, so it must be cheap and safe to
//! run redundantly. A desired name is skipped while an attempt for it is in
//! flight on the current connection, and for the rest of that connection
//! once the server has refused it. Auto-authentication is attempted once
//! per connection.

use super::session::{Outcome, SessionCore};
use crate::protocol::RoomAction;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attempt bookkeeping for one desired set
#[derive(Debug, Default)]
pub(super) struct Tracked {
    /// Name -> epoch of the attempt still awaiting its answer
    in_flight: HashMap<String, u64>,
    /// Name -> epoch in which the server refused it
    refused: HashMap<String, u64>,
}

impl Tracked {
    /// Record a new attempt for `name`; false if one is pending or was refused in `epoch`
    fn claim(&mut self, epoch: u64, name: &str) -> bool {
        if self.in_flight.get(name) == Some(&epoch) || self.refused.get(name) == Some(&epoch) {
            return false;
        }
        self.in_flight.insert(name.to_string(), epoch);
        true
    }

    /// The attempt made in `epoch` finished
    fn settle(&mut self, epoch: u64, name: &str, outcome: Outcome) {
        if self.in_flight.get(name) == Some(&epoch) {
            self.in_flight.remove(name);
        }
        if outcome == Outcome::Rejected {
            self.refused.insert(name.to_string(), epoch);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Desired {
    Channel,
    Room,
}

impl SessionCore {
    pub(super) fn reconcile(self: &Arc<Self>) {
        let state = self.snapshot();
        if !state.is_connected {
            return;
        }
        let epoch = self.current_epoch();

        if !state.is_authenticated {
            if !self.config.auto_authenticate {
                return;
            }
            let (Some(user_id), Some(session_id)) =
                (self.config.user_id.clone(), self.config.session_id.clone())
            else {
                return;
            };
            {
                let mut attempts = self.attempts.lock();
                if attempts.authenticate == Some(epoch) {
                    return;
                }
                attempts.authenticate = Some(epoch);
            }

            debug!(epoch, user_id = %user_id, "Auto-authenticating");
            let core = Arc::clone(self);
            self.spawn(async move {
                core.authenticate(&user_id, &session_id).await;
            });
            return;
        }

        for channel in &self.config.channels {
            if state.has_channel(channel) || !self.claim(Desired::Channel, epoch, channel) {
                continue;
            }
            debug!(epoch, channel = %channel, "Subscribing desired channel");
            let core = Arc::clone(self);
            let name = channel.clone();
            self.spawn_tracked(Desired::Channel, epoch, channel, async move {
                core.subscribe(&name).await
            });
        }

        for room in &self.config.rooms {
            if state.has_room(room) || !self.claim(Desired::Room, epoch, room) {
                continue;
            }
            debug!(epoch, room = %room, "Joining desired room");
            let core = Arc::clone(self);
            let name = room.clone();
            self.spawn_tracked(Desired::Room, epoch, room, async move {
                core.room(&name, RoomAction::Join).await
            });
        }
    }

    fn claim(&self, desired: Desired, epoch: u64, name: &str) -> bool {
        let mut attempts = self.attempts.lock();
        let tracked = match desired {
            Desired::Channel => &mut attempts.channels,
            Desired::Room => &mut attempts.rooms,
        };
        tracked.claim(epoch, name)
    }

    fn settle(&self, desired: Desired, epoch: u64, name: &str, outcome: Outcome) {
        let mut attempts = self.attempts.lock();
        let tracked = match desired {
            Desired::Channel => &mut attempts.channels,
            Desired::Room => &mut attempts.rooms,
        };
        tracked.settle(epoch, name, outcome);
    }

    /// Run a claimed attempt and release the claim with its outcome
    fn spawn_tracked(
        self: &Arc<Self>,
        desired: Desired,
        epoch: u64,
        name: &str,
        attempt: impl Future<Output = Outcome> + Send + 'static,
    ) {
        let core = Arc::clone(self);
        let owned = name.to_string();
        let spawned = self.spawn(async move {
            let outcome = attempt.await;
            debug!(name = %owned, ?outcome, "Reconciliation attempt finished");
            core.settle(desired, epoch, &owned, outcome);
        });
        if !spawned {
            self.settle(desired, epoch, name, Outcome::Failed);
        }
    }

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) -> bool {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(task);
                true
            }
            Err(_) => {
                warn!("No Tokio runtime, reconciliation skipped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_blocks_while_in_flight() {
        let mut tracked = Tracked::default();
        assert!(tracked.claim(1, "promo"));
        assert!(!tracked.claim(1, "promo"));
        assert!(tracked.claim(1, "orders"));

        tracked.settle(1, "promo", Outcome::Failed);
        assert!(tracked.claim(1, "promo"), "an unanswered attempt blocked a retry");
    }

    #[test]
    fn test_refusal_holds_for_the_connection() {
        let mut tracked = Tracked::default();
        assert!(tracked.claim(1, "vip"));
        tracked.settle(1, "vip", Outcome::Rejected);

        assert!(!tracked.claim(1, "vip"));
        assert!(tracked.claim(2, "vip"), "a refusal outlived its connection");
    }

    #[test]
    fn test_stale_attempt_does_not_release_newer_claim() {
        let mut tracked = Tracked::default();
        assert!(tracked.claim(1, "promo"));
        assert!(tracked.claim(2, "promo"));

        tracked.settle(1, "promo", Outcome::Failed);
        assert!(!tracked.claim(2, "promo"));
    }
}
