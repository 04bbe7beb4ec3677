//! Engine.IO v4 / Socket.IO v5 frame codec
//!
//! Every WebSocket text frame is one Engine.IO packet. Engine.IO `message`
//! packets carry one Socket.IO packet for the default namespace:
//!
//! ```text
//! 0{"sid":..,"pingInterval":..}   open          (server -> client)
//! 2 / 3                           ping / pong
//! 40 / 40{"sid":".."}             namespace connect / connect ack
//! 41                              namespace disconnect
//! 42["event",{..}]                event
//! 44{"message":".."}              connect error
//! ```
//!
//! Binary attachments and ack-ids are not part of the supported protocol:
//! binary packet types are rejected, ack-ids on inbound events are skipped.

use crate::error::{Result, SocketError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine.IO open handshake payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Socket.IO packet on the default namespace
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Option<Value> },
    ConnectError(Value),
}

impl EnginePacket {
    /// Shorthand for an outbound event frame
    pub fn event(name: impl Into<String>, data: Option<Value>) -> Self {
        EnginePacket::Message(SocketPacket::Event {
            name: name.into(),
            data,
        })
    }
}

/// Encode a packet into a WebSocket text frame
pub fn encode(packet: &EnginePacket) -> String {
    match packet {
        EnginePacket::Open(handshake) => format!(
            "0{}",
            serde_json::to_value(handshake).unwrap_or(Value::Null)
        ),
        EnginePacket::Close => "1".to_string(),
        EnginePacket::Ping => "2".to_string(),
        EnginePacket::Pong => "3".to_string(),
        EnginePacket::Message(socket) => format!("4{}", encode_socket(socket)),
        EnginePacket::Upgrade => "5".to_string(),
        EnginePacket::Noop => "6".to_string(),
    }
}

fn encode_socket(packet: &SocketPacket) -> String {
    match packet {
        SocketPacket::Connect(None) => "0".to_string(),
        SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
        SocketPacket::Disconnect => "1".to_string(),
        SocketPacket::Event { name, data } => {
            let mut args = vec![Value::String(name.clone())];
            if let Some(data) = data {
                args.push(data.clone());
            }
            format!("2{}", Value::Array(args))
        }
        SocketPacket::ConnectError(payload) => format!("4{}", payload),
    }
}

/// Decode one WebSocket text frame
pub fn decode(frame: &str) -> Result<EnginePacket> {
    let kind = frame
        .chars()
        .next()
        .ok_or_else(|| SocketError::Codec("empty frame".into()))?;
    let rest = &frame[kind.len_utf8()..];

    match kind {
        '0' => Ok(EnginePacket::Open(parse_json(rest)?)),
        '1' => Ok(EnginePacket::Close),
        // "2probe" / "3probe" belong to the polling upgrade dance; the payload is irrelevant here
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => Ok(EnginePacket::Message(decode_socket(rest)?)),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(SocketError::Codec(format!(
            "unknown engine packet type '{}'",
            other
        ))),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket> {
    let kind = body
        .chars()
        .next()
        .ok_or_else(|| SocketError::Codec("empty socket packet".into()))?;
    let mut rest = &body[kind.len_utf8()..];

    if rest.starts_with('/') {
        let (namespace, tail) = match rest.find(',') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        if namespace != "/" {
            return Err(SocketError::Codec(format!(
                "unsupported namespace '{}'",
                namespace
            )));
        }
        rest = tail;
    }

    let ack_digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    rest = &rest[ack_digits..];

    match kind {
        '0' => {
            if rest.is_empty() {
                Ok(SocketPacket::Connect(None))
            } else {
                Ok(SocketPacket::Connect(Some(parse_json(rest)?)))
            }
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let args: Vec<Value> = parse_json(rest)?;
            let mut args = args.into_iter();
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => return Err(SocketError::Codec("event without a name".into())),
            };
            Ok(SocketPacket::Event {
                name,
                data: args.next(),
            })
        }
        '4' => {
            if rest.is_empty() {
                Ok(SocketPacket::ConnectError(Value::Null))
            } else {
                Ok(SocketPacket::ConnectError(parse_json(rest)?))
            }
        }
        '3' | '5' | '6' => Err(SocketError::Codec(format!(
            "unsupported socket packet type '{}' (acks and binary attachments)",
            kind
        ))),
        other => Err(SocketError::Codec(format!(
            "unknown socket packet type '{}'",
            other
        ))),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| SocketError::Codec(e.to_string()))
}
