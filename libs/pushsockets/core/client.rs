use crate::codec::{self, EnginePacket, OpenHandshake, SocketPacket};
use crate::config::TransportConfig;
use crate::connection_state::{AtomicTransportState, TransportState};
use crate::traits::*;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Internal command messages for client control
#[derive(Debug)]
enum ClientCommand {
    /// Send an encoded frame to the WebSocket
    Emit(String),
    /// Close the link and stop reconnecting
    Close,
}

/// Why a connected message loop ended without an error
enum LoopExit {
    ClosedByClient,
    ClosedByServer,
}

/// Socket.IO client over a single WebSocket
///
/// One Tokio task owns the socket: it performs the Engine.IO and namespace
/// handshakes, answers server pings, forwards named events to the event sink
/// and reconnects according to the configured strategy. The handle only
/// queues commands and reads the atomic state.
pub struct SocketIoClient {
    /// Atomic transport state
    state: Arc<AtomicTransportState>,
    /// Command channel sender
    command_tx: UnboundedSender<ClientCommand>,
    /// Cleared by `close()`; checked before every (re)connection attempt
    running: Arc<AtomicBool>,
    /// Connection task handle
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SocketIoClient {
    /// Spawn the connection task on the current Tokio runtime
    ///
    /// The first connection attempt starts immediately.
    pub fn spawn(config: TransportConfig, events: EventSink) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SocketError::Configuration("a Tokio runtime is required to open a transport".into())
        })?;

        let state = Arc::new(AtomicTransportState::new(TransportState::Disconnected));
        let running = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = unbounded_channel();

        let task_handle = {
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            runtime.spawn(async move {
                run_client(config, state, running, command_rx, events).await;
            })
        };

        Ok(Self {
            state,
            command_tx,
            running,
            task_handle: Some(task_handle),
        })
    }

    /// Get current transport state
    #[inline]
    pub fn transport_state(&self) -> TransportState {
        self.state.get()
    }

    /// Close the link and wait for the connection task to finish
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down Socket.IO transport");
        self.close();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| SocketError::Other(e.to_string()))?;
        }
        Ok(())
    }
}

impl TransportHandle for SocketIoClient {
    fn emit(&self, event: &str, data: Option<Value>) -> Result<()> {
        if !self.state.is_connected() {
            return Err(SocketError::ConnectionClosed(format!(
                "cannot emit '{}' while {:?}",
                event,
                self.state.get()
            )));
        }

        let frame = codec::encode(&EnginePacket::event(event, data));
        self.command_tx
            .send(ClientCommand::Emit(frame))
            .map_err(|e| SocketError::ChannelSend(e.to_string()))
    }

    fn close(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("Closing Socket.IO transport");
            // The task may already be gone; the flag alone stops it then
            let _ = self.command_tx.send(ClientCommand::Close);
        }
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

impl Drop for SocketIoClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Production [`Connector`]: one [`SocketIoClient`] per `open`
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    config: TransportConfig,
}

impl WebSocketConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, events: EventSink) -> Result<Box<dyn TransportHandle>> {
        info!(url = %self.config.url, "Opening Socket.IO transport");
        Ok(Box::new(SocketIoClient::spawn(self.config.clone(), events)?))
    }
}

/// Main connection task loop
async fn run_client(
    config: TransportConfig,
    state: Arc<AtomicTransportState>,
    running: Arc<AtomicBool>,
    mut command_rx: UnboundedReceiver<ClientCommand>,
    events: EventSink,
) {
    let mut reconnect_attempt = 0;

    loop {
        if !running.load(Ordering::Acquire) {
            debug!("Transport closed, exiting connection loop");
            break;
        }

        state.set(if reconnect_attempt == 0 {
            TransportState::Connecting
        } else {
            TransportState::Reconnecting
        });

        if reconnect_attempt > 0 {
            let _ = events.send(TransportEvent::Reconnecting {
                attempt: reconnect_attempt,
            });
        }

        match timeout(config.handshake_timeout, establish(&config.url)).await {
            Ok(Ok((write, read, handshake, sid))) => {
                info!(url = %config.url, sid = %sid, "Connected");
                state.set(TransportState::Connected);
                reconnect_attempt = 0;
                discard_stale_commands(&mut command_rx);
                let _ = events.send(TransportEvent::Connected { sid });

                let exit =
                    message_loop(write, read, &handshake, &running, &mut command_rx, &events).await;
                state.set(TransportState::Disconnected);

                match exit {
                    Ok(LoopExit::ClosedByClient) => {
                        info!("Transport closed by client");
                        let _ = events.send(TransportEvent::Disconnected {
                            reason: "io client disconnect".into(),
                        });
                        break;
                    }
                    Ok(LoopExit::ClosedByServer) => {
                        warn!("Server disconnected the namespace, not reconnecting");
                        let _ = events.send(TransportEvent::Disconnected {
                            reason: "io server disconnect".into(),
                        });
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Connection lost");
                        let reason = match e {
                            SocketError::Timeout(_) => "ping timeout",
                            _ => "transport close",
                        };
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        let _ = events.send(TransportEvent::Disconnected {
                            reason: reason.into(),
                        });
                    }
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect");
                let _ = events.send(TransportEvent::Error(e.to_string()));
                state.set(TransportState::Disconnected);
            }
            Err(_) => {
                let e = SocketError::Timeout(format!(
                    "handshake did not complete within {:?}",
                    config.handshake_timeout
                ));
                error!(error = %e, "Failed to connect");
                let _ = events.send(TransportEvent::Error(e.to_string()));
                state.set(TransportState::Disconnected);
            }
        }

        if !running.load(Ordering::Acquire) {
            debug!("Transport closed during connection, stopping reconnection");
            break;
        }

        if let Some(delay) = config.reconnect_strategy.next_delay(reconnect_attempt) {
            info!(
                "Reconnecting in {:?} (attempt {})",
                delay,
                reconnect_attempt + 1
            );
            if !interruptible_sleep(delay, &running).await {
                debug!("Transport closed during reconnection delay");
                break;
            }
            reconnect_attempt += 1;
        } else {
            warn!("Reconnection strategy exhausted, stopping");
            let _ = events.send(TransportEvent::ReconnectFailed {
                attempts: reconnect_attempt,
            });
            break;
        }
    }

    state.set(TransportState::Disconnected);
    debug!("Transport task exiting");
}

/// Open the WebSocket and complete the Engine.IO and namespace handshakes
async fn establish(url: &str) -> Result<(WsWrite, WsRead, OpenHandshake, String)> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| SocketError::WebSocket(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    let handshake = loop {
        match next_packet(&mut read).await? {
            EnginePacket::Open(handshake) => break handshake,
            other => debug!("Ignoring {:?} before Engine.IO open", other),
        }
    };
    debug!(
        sid = %handshake.sid,
        ping_interval = handshake.ping_interval,
        ping_timeout = handshake.ping_timeout,
        "Engine.IO session opened"
    );

    send_packet(&mut write, &EnginePacket::Message(SocketPacket::Connect(None))).await?;

    loop {
        match next_packet(&mut read).await? {
            EnginePacket::Message(SocketPacket::Connect(payload)) => {
                let sid = payload
                    .as_ref()
                    .and_then(|p| p.get("sid"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| handshake.sid.clone());
                return Ok((write, read, handshake, sid));
            }
            EnginePacket::Message(SocketPacket::ConnectError(payload)) => {
                return Err(SocketError::Handshake(connect_error_message(&payload)));
            }
            EnginePacket::Ping => send_packet(&mut write, &EnginePacket::Pong).await?,
            EnginePacket::Close => {
                return Err(SocketError::ConnectionClosed(
                    "server closed the session during handshake".into(),
                ));
            }
            other => debug!("Ignoring {:?} during namespace handshake", other),
        }
    }
}

/// Main message processing loop for an established connection
async fn message_loop(
    mut write: WsWrite,
    mut read: WsRead,
    handshake: &OpenHandshake,
    running: &AtomicBool,
    command_rx: &mut UnboundedReceiver<ClientCommand>,
    events: &EventSink,
) -> Result<LoopExit> {
    // The server pings every ping_interval and gives up after ping_timeout;
    // silence beyond both means the link is dead.
    let liveness = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    let mut deadline = Instant::now() + liveness;

    loop {
        if !running.load(Ordering::Acquire) {
            close_gracefully(&mut write).await;
            return Ok(LoopExit::ClosedByClient);
        }

        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match codec::decode(&text) {
                        Ok(EnginePacket::Ping) => {
                            deadline = Instant::now() + liveness;
                            send_packet(&mut write, &EnginePacket::Pong).await?;
                            debug!("Answered server ping");
                        }
                        Ok(EnginePacket::Message(SocketPacket::Event { name, data })) => {
                            debug!(event = %name, "Received event");
                            let _ = events.send(TransportEvent::Message { event: name, data });
                        }
                        Ok(EnginePacket::Message(SocketPacket::Disconnect)) => {
                            return Ok(LoopExit::ClosedByServer);
                        }
                        Ok(EnginePacket::Message(SocketPacket::ConnectError(payload))) => {
                            let _ = events.send(TransportEvent::Error(connect_error_message(&payload)));
                        }
                        Ok(EnginePacket::Close) => {
                            return Err(SocketError::ConnectionClosed(
                                "server closed the Engine.IO session".into(),
                            ));
                        }
                        Ok(other) => debug!("Ignoring {:?}", other),
                        Err(e) => {
                            warn!(error = %e, "Dropping undecodable frame");
                            let _ = events.send(TransportEvent::Error(e.to_string()));
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        return Err(SocketError::ConnectionClosed(format!("close frame {:?}", frame)));
                    }
                    // Protocol-level pings are answered by tungstenite itself
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return Err(SocketError::WebSocket(e.to_string()));
                    }
                    None => {
                        warn!("WebSocket stream closed");
                        return Err(SocketError::ConnectionClosed("Stream ended".into()));
                    }
                }
            }

            cmd = command_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Emit(frame)) => {
                        write
                            .send(Message::Text(frame))
                            .await
                            .map_err(|e| SocketError::WebSocket(e.to_string()))?;
                    }
                    Some(ClientCommand::Close) | None => {
                        close_gracefully(&mut write).await;
                        return Ok(LoopExit::ClosedByClient);
                    }
                }
            }

            _ = tokio::time::sleep_until(deadline) => {
                return Err(SocketError::Timeout(format!(
                    "no ping from server within {:?}",
                    liveness
                )));
            }
        }
    }
}

/// Read until the next Engine.IO packet
async fn next_packet(read: &mut WsRead) -> Result<EnginePacket> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return codec::decode(&text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(SocketError::ConnectionClosed(
                    "socket closed during handshake".into(),
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(SocketError::WebSocket(e.to_string())),
        }
    }
}

async fn send_packet(write: &mut WsWrite, packet: &EnginePacket) -> Result<()> {
    write
        .send(Message::Text(codec::encode(packet)))
        .await
        .map_err(|e| SocketError::WebSocket(e.to_string()))
}

/// Leave the namespace, then close the socket. Errors are irrelevant at this point.
async fn close_gracefully(write: &mut WsWrite) {
    let _ = send_packet(write, &EnginePacket::Message(SocketPacket::Disconnect)).await;
    let _ = write.close().await;
}

/// Frames queued for a previous link are not replayed on a new one
fn discard_stale_commands(command_rx: &mut UnboundedReceiver<ClientCommand>) {
    let mut dropped = 0;
    while let Ok(cmd) = command_rx.try_recv() {
        if let ClientCommand::Emit(_) = cmd {
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!(dropped, "Discarded frames queued before reconnection");
    }
}

fn connect_error_message(payload: &Value) -> String {
    payload
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

/// Sleep in short slices so a close during the delay is noticed promptly
///
/// Returns false if the transport was closed while sleeping.
async fn interruptible_sleep(duration: Duration, running: &AtomicBool) -> bool {
    let check_interval = Duration::from_millis(100);
    let mut elapsed = Duration::ZERO;

    while elapsed < duration {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let slice = std::cmp::min(check_interval, duration - elapsed);
        tokio::time::sleep(slice).await;
        elapsed += slice;
    }

    running.load(Ordering::Acquire)
}
