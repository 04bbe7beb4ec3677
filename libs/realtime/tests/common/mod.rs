//! Common test utilities for realtime session tests
//!
//! `MockConnector` hands out in-memory transports whose server side is
//! scripted from the test: accept the connection, drop it, push events.

#![allow(dead_code)]

use pushsockets::{Connector, EventSink, SocketError, TransportEvent, TransportHandle};
use realtime::{RealtimeSessionManager, SessionConfig, SessionEvent};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Server side of one in-memory transport
pub struct MockLink {
    sink: Mutex<Option<EventSink>>,
    connected: AtomicBool,
    closed: AtomicBool,
    emitted: Mutex<Vec<(String, Option<Value>)>>,
    sid: String,
}

impl MockLink {
    fn new(sink: EventSink, sid: String) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            emitted: Mutex::new(Vec::new()),
            sid,
        }
    }

    fn send(&self, event: TransportEvent) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send(event);
        }
    }

    /// Complete the handshake
    pub fn accept(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.send(TransportEvent::Connected {
            sid: self.sid.clone(),
        });
    }

    /// Lose the link the way a network drop does; the transport keeps retrying
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.send(TransportEvent::Error("Connection closed: Stream ended".into()));
        self.send(TransportEvent::Disconnected {
            reason: "transport close".into(),
        });
    }

    /// Retry after a drop and succeed
    pub fn reconnect(&self) {
        self.send(TransportEvent::Reconnecting { attempt: 1 });
        self.accept();
    }

    /// Server-side namespace disconnect: the transport stops for good
    pub fn server_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.send(TransportEvent::Disconnected {
            reason: "io server disconnect".into(),
        });
        self.sink.lock().unwrap().take();
    }

    pub fn error(&self, message: &str) {
        self.send(TransportEvent::Error(message.to_string()));
    }

    /// Push a named event from the server
    pub fn reply(&self, event: &str, data: Value) {
        self.send(TransportEvent::Message {
            event: event.to_string(),
            data: Some(data),
        });
    }

    pub fn emitted(&self) -> Vec<(String, Option<Value>)> {
        self.emitted.lock().unwrap().clone()
    }

    /// Payloads of every emission of `event`
    pub fn emitted_named(&self, event: &str) -> Vec<Option<Value>> {
        self.emitted()
            .into_iter()
            .filter(|(name, _)| name == event)
            .map(|(_, data)| data)
            .collect()
    }

    /// Wait until `event` has been emitted at least `count` times
    pub async fn wait_for_emit(&self, event: &str, count: usize) -> bool {
        wait_until(Duration::from_secs(2), || self.emitted_named(event).len() >= count).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockTransport(Arc<MockLink>);

impl TransportHandle for MockTransport {
    fn emit(&self, event: &str, data: Option<Value>) -> pushsockets::Result<()> {
        if !self.0.connected.load(Ordering::SeqCst) {
            return Err(SocketError::ConnectionClosed("mock link is down".into()));
        }
        self.0
            .emitted
            .lock()
            .unwrap()
            .push((event.to_string(), data));
        Ok(())
    }

    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
        self.0.connected.store(false, Ordering::SeqCst);
        self.0.sink.lock().unwrap().take();
    }

    fn is_connected(&self) -> bool {
        self.0.connected.load(Ordering::SeqCst)
    }
}

/// Connector handing out scripted in-memory transports
#[derive(Default)]
pub struct MockConnector {
    links: Mutex<Vec<Arc<MockLink>>>,
    fail_open: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following `open` fail
    pub fn fail_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn link(&self, index: usize) -> Arc<MockLink> {
        Arc::clone(&self.links.lock().unwrap()[index])
    }

    pub fn last_link(&self) -> Arc<MockLink> {
        Arc::clone(self.links.lock().unwrap().last().expect("no transport opened"))
    }
}

impl Connector for MockConnector {
    fn open(&self, events: EventSink) -> pushsockets::Result<Box<dyn TransportHandle>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SocketError::Configuration("mock connector refused".into()));
        }
        let mut links = self.links.lock().unwrap();
        let link = Arc::new(MockLink::new(events, format!("sid-{}", links.len() + 1)));
        links.push(Arc::clone(&link));
        Ok(Box::new(MockTransport(link)))
    }
}

/// Short acknowledgment timeout so failure paths finish quickly
pub fn test_config() -> SessionConfig {
    SessionConfig::new("http://localhost:3001").with_ack_timeout(Duration::from_millis(200))
}

pub fn session(config: SessionConfig) -> (RealtimeSessionManager, Arc<MockConnector>) {
    let connector = MockConnector::new();
    let session = RealtimeSessionManager::new(config, connector.clone());
    (session, connector)
}

/// Session whose transport has connected
pub async fn connected_session(
    config: SessionConfig,
) -> (RealtimeSessionManager, Arc<MockConnector>, Arc<MockLink>) {
    let (session, connector) = session(config);
    session.connect();
    let link = connector.last_link();
    link.accept();
    assert!(
        wait_until(Duration::from_secs(2), || session.get_status().is_connected).await,
        "session never saw the transport connect"
    );
    (session, connector, link)
}

/// Session that is connected and authenticated as u1/s1 with connection id c1
pub async fn authenticated_session(
    config: SessionConfig,
) -> (RealtimeSessionManager, Arc<MockConnector>, Arc<MockLink>) {
    let (session, connector, link) = connected_session(config).await;
    let (ok, _) = tokio::join!(session.authenticate("u1", "s1"), async {
        assert!(link.wait_for_emit("authenticate", 1).await);
        link.reply(
            "authenticated",
            serde_json::json!({ "success": true, "connectionId": "c1" }),
        );
    });
    assert!(ok, "authentication failed");
    (session, connector, link)
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Everything published so far
pub fn drain_events(session: &RealtimeSessionManager) -> Vec<SessionEvent> {
    std::iter::from_fn(|| session.try_recv_event()).collect()
}

/// Wait for the first event matching `predicate`, discarding the others
pub async fn wait_for_event(
    session: &RealtimeSessionManager,
    mut predicate: impl FnMut(&SessionEvent) -> bool,
) -> Option<SessionEvent> {
    let mut found = None;
    wait_until(Duration::from_secs(2), || {
        while let Some(event) = session.try_recv_event() {
            verbose_println!("  Event: {:?}", event);
            if predicate(&event) {
                found = Some(event);
                return true;
            }
        }
        false
    })
    .await;
    found
}

/// Wait for the `nth` emission of `request`, then answer it with `result`
pub async fn respond(link: &MockLink, request: &str, nth: usize, result: &str, payload: Value) {
    assert!(
        link.wait_for_emit(request, nth).await,
        "'{}' was not emitted {} time(s)",
        request,
        nth
    );
    link.reply(result, payload);
}
