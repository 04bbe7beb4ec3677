//! Acknowledgment races
//!
//! An operation registers a one-shot waiter for its result event, emits the
//! request, then waits with a deadline. The waiter unregisters itself on
//! drop, so a timed-out (or cancelled) operation leaves nothing behind and a
//! late acknowledgment finds no one to resolve.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

struct Pending {
    id: u64,
    event: String,
    key: Option<String>,
    tx: oneshot::Sender<Value>,
}

#[derive(Default)]
struct Waiters {
    next_id: u64,
    /// Registration order
    pending: Vec<Pending>,
}

/// Pending acknowledgment waiters, keyed by result event and optional name
#[derive(Clone, Default)]
pub struct AckRegistry {
    waiters: Arc<Mutex<Waiters>>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `event`, optionally scoped to a channel or room name
    pub fn register(&self, event: &str, key: Option<&str>) -> AckWaiter {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock();
        let id = waiters.next_id;
        waiters.next_id += 1;
        waiters.pending.push(Pending {
            id,
            event: event.to_string(),
            key: key.map(str::to_string),
            tx,
        });

        AckWaiter {
            id,
            rx,
            registry: Arc::clone(&self.waiters),
        }
    }

    /// Hand an inbound acknowledgment to the waiter it answers
    ///
    /// A named acknowledgment only resolves a waiter registered under that
    /// name; an unnamed one resolves the oldest waiter for `event`. Returns
    /// false if no one was waiting.
    pub fn resolve(&self, event: &str, key: Option<&str>, payload: Value) -> bool {
        match key {
            Some(key) => self.resolve_any(event, &[key], payload),
            None => self.complete(event, |_| true, payload),
        }
    }

    /// Resolve the oldest waiter for `event` registered under any of `keys`
    pub fn resolve_any(&self, event: &str, keys: &[&str], payload: Value) -> bool {
        self.complete(
            event,
            |key| key.map_or(false, |key| keys.contains(&key)),
            payload,
        )
    }

    fn complete(&self, event: &str, accepts: impl Fn(Option<&str>) -> bool, payload: Value) -> bool {
        let pending = {
            let mut waiters = self.waiters.lock();
            let index = waiters
                .pending
                .iter()
                .position(|p| p.event == event && accepts(p.key.as_deref()));
            match index {
                Some(index) => waiters.pending.remove(index),
                None => {
                    debug!(event, "Acknowledgment with no pending waiter dropped");
                    return false;
                }
            }
        };

        pending.tx.send(payload).is_ok()
    }

    /// Number of waiters currently registered
    pub fn pending(&self) -> usize {
        self.waiters.lock().pending.len()
    }

    #[cfg(test)]
    fn pending_for(&self, event: &str) -> usize {
        self.waiters
            .lock()
            .pending
            .iter()
            .filter(|p| p.event == event)
            .count()
    }
}

impl std::fmt::Debug for AckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckRegistry")
            .field("pending", &self.pending())
            .finish()
    }
}

/// One registered waiter; unregisters itself when dropped
pub struct AckWaiter {
    id: u64,
    rx: oneshot::Receiver<Value>,
    registry: Arc<Mutex<Waiters>>,
}

impl AckWaiter {
    /// Wait for the acknowledgment payload, or `None` once `deadline` passes
    pub async fn wait(mut self, deadline: Duration) -> Option<Value> {
        match tokio::time::timeout(deadline, &mut self.rx).await {
            Ok(Ok(payload)) => Some(payload),
            Ok(Err(_)) => None,
            Err(_) => {
                debug!(?deadline, "Acknowledgment timed out");
                None
            }
        }
    }
}

impl Drop for AckWaiter {
    fn drop(&mut self) {
        self.registry.lock().pending.retain(|p| p.id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolves_matching_waiter() {
        let registry = AckRegistry::new();
        let waiter = registry.register("subscription_result", Some("promo"));

        assert!(registry.resolve("subscription_result", Some("promo"), json!({ "success": true })));
        assert_eq!(
            waiter.wait(Duration::from_millis(100)).await,
            Some(json!({ "success": true }))
        );
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_keyed_match_beats_registration_order() {
        let registry = AckRegistry::new();
        let promo = registry.register("subscription_result", Some("promo"));
        let orders = registry.register("subscription_result", Some("orders"));

        assert!(registry.resolve("subscription_result", Some("orders"), json!("orders")));
        assert!(registry.resolve("subscription_result", None, json!("first")));

        assert_eq!(orders.wait(Duration::from_millis(100)).await, Some(json!("orders")));
        assert_eq!(promo.wait(Duration::from_millis(100)).await, Some(json!("first")));
    }

    #[tokio::test]
    async fn test_named_ack_never_resolves_another_name() {
        let registry = AckRegistry::new();
        let promo = registry.register("subscription_result", Some("promo"));

        assert!(!registry.resolve("subscription_result", Some("orders"), json!("orders")));
        assert_eq!(registry.pending_for("subscription_result"), 1);

        assert_eq!(promo.wait(Duration::from_millis(20)).await, None);
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_resolve_any_takes_oldest_listed_key() {
        let registry = AckRegistry::new();
        let vip = registry.register("room_result", Some("vip:joined"));
        let leave = registry.register("room_result", Some("lobby:left"));
        let join = registry.register("room_result", Some("lobby:joined"));

        assert!(registry.resolve_any("room_result", &["lobby:joined", "lobby:left"], json!(1)));
        assert_eq!(leave.wait(Duration::from_millis(100)).await, Some(json!(1)));
        assert_eq!(registry.pending(), 2);

        assert!(!registry.resolve_any("room_result", &["hall:joined"], json!(2)));
        drop(vip);
        drop(join);
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_timeout_unregisters_waiter() {
        let registry = AckRegistry::new();
        let waiter = registry.register("authenticated", None);
        assert_eq!(registry.pending_for("authenticated"), 1);

        assert_eq!(waiter.wait(Duration::from_millis(20)).await, None);
        assert_eq!(registry.pending(), 0);

        // Late acknowledgment finds nobody
        assert!(!registry.resolve("authenticated", None, json!({ "success": true })));
    }

    #[test]
    fn test_dropped_waiter_is_removed() {
        let registry = AckRegistry::new();
        let waiter = registry.register("room_result", Some("lobby"));
        let _other = registry.register("custom_event_result", None);

        drop(waiter);
        assert_eq!(registry.pending_for("room_result"), 0);
        assert_eq!(registry.pending(), 1);
    }

    #[test]
    fn test_unrelated_event_does_not_resolve() {
        let registry = AckRegistry::new();
        let _waiter = registry.register("room_result", None);

        assert!(!registry.resolve("subscription_result", None, json!({})));
        assert_eq!(registry.pending(), 1);
    }
}
