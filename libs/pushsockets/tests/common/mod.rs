//! Common test utilities for PushSockets integration tests
//!
//! Provides a minimal in-process Socket.IO server speaking the
//! WebSocket-only Engine.IO v4 handshake.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Frame pushed to the mock server to make it drop the current socket
pub const DROP_CONNECTION: &str = "__drop__";

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    /// Answer the namespace connect with `44` instead of `40`
    pub reject_namespace: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            ping_interval_ms: 25_000,
            ping_timeout_ms: 20_000,
            reject_namespace: false,
        }
    }
}

/// A simple mock Socket.IO server for testing
pub struct MockSocketIoServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    outbound: broadcast::Sender<String>,
    shutdown: Arc<Notify>,
}

impl MockSocketIoServer {
    /// Start a server with default heartbeat settings
    pub async fn start() -> Self {
        Self::start_with(ServerOptions::default()).await
    }

    pub async fn start_with(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let (outbound, _) = broadcast::channel(64);

        {
            let shutdown = Arc::clone(&shutdown);
            let received = Arc::clone(&received);
            let outbound = outbound.clone();

            tokio::spawn(async move {
                let mut session = 0u32;
                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            match result {
                                Ok((stream, _)) => {
                                    session += 1;
                                    tokio::spawn(Self::handle_connection(
                                        stream,
                                        session,
                                        options.clone(),
                                        Arc::clone(&received),
                                        outbound.subscribe(),
                                        Arc::clone(&shutdown),
                                    ));
                                }
                                Err(e) => {
                                    eprintln!("Accept error: {}", e);
                                    break;
                                }
                            }
                        }
                        _ = shutdown.notified() => break,
                    }
                }
            });
        }

        Self {
            addr,
            received,
            outbound,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        session: u32,
        options: ServerOptions,
        received: Arc<Mutex<Vec<String>>>,
        mut outbound: broadcast::Receiver<String>,
        shutdown: Arc<Notify>,
    ) {
        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let open = format!(
            r#"0{{"sid":"eio-{}","upgrades":[],"pingInterval":{},"pingTimeout":{},"maxPayload":1000000}}"#,
            session, options.ping_interval_ms, options.ping_timeout_ms
        );
        if write.send(Message::Text(open)).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            received.lock().unwrap().push(text.clone());
                            if text == "40" {
                                let reply = if options.reject_namespace {
                                    r#"44{"message":"unauthorized"}"#.to_string()
                                } else {
                                    format!(r#"40{{"sid":"ns-{}"}}"#, session)
                                };
                                if write.send(Message::Text(reply)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                frame = outbound.recv() => {
                    match frame {
                        Ok(frame) if frame == DROP_CONNECTION => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                        Ok(frame) => {
                            if write.send(Message::Text(frame)).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                _ = shutdown.notified() => break,
            }
        }
    }

    /// WebSocket endpoint of this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}/socket.io/?EIO=4&transport=websocket", self.addr)
    }

    /// Send a raw frame to every connected client
    pub fn push(&self, frame: &str) {
        let _ = self.outbound.send(frame.to_string());
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until the server has received `frame` (at least `count` times)
    pub async fn wait_for_frame_count(&self, frame: &str, count: usize) -> bool {
        for _ in 0..500 {
            if self.received().iter().filter(|f| f.as_str() == frame).count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub async fn wait_for_frame(&self, frame: &str) -> bool {
        self.wait_for_frame_count(frame, 1).await
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockSocketIoServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// An address nothing listens on
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
