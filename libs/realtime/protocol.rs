//! Wire contract of the push server
//!
//! Requests are emitted as named events; every request that expects an
//! answer has a matching result event.
//!
//! | Outbound      | Inbound result          |
//! |---------------|-------------------------|
//! | authenticate  | authenticated           |
//! | subscribe     | subscription_result     |
//! | unsubscribe   | unsubscription_result   |
//! | join_room     | room_result             |
//! | leave_room    | room_result             |
//! | custom_event  | custom_event_result     |
//! | ping          | pong                    |

use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const AUTHENTICATE: &str = "authenticate";
pub const AUTHENTICATED: &str = "authenticated";
pub const SUBSCRIBE: &str = "subscribe";
pub const SUBSCRIPTION_RESULT: &str = "subscription_result";
pub const UNSUBSCRIBE: &str = "unsubscribe";
pub const UNSUBSCRIPTION_RESULT: &str = "unsubscription_result";
pub const JOIN_ROOM: &str = "join_room";
pub const LEAVE_ROOM: &str = "leave_room";
pub const ROOM_RESULT: &str = "room_result";
pub const CUSTOM_EVENT: &str = "custom_event";
pub const CUSTOM_EVENT_RESULT: &str = "custom_event_result";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const REALTIME_EVENT: &str = "realtime_event";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest<'a> {
    pub user_id: &'a str,
    pub session_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRequest<'a> {
    pub channel_name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest<'a> {
    pub room_name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomEventRequest<'a> {
    pub event: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<&'a str>,
}

/// `authenticated` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `subscription_result` / `unsubscription_result` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `room_result` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `custom_event_result` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomEventAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Which way a room operation goes; the ack must echo it back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAction {
    Join,
    Leave,
}

impl RoomAction {
    /// `action` value the server reports for this operation
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomAction::Join => "joined",
            RoomAction::Leave => "left",
        }
    }

    pub fn request_event(&self) -> &'static str {
        match self {
            RoomAction::Join => JOIN_ROOM,
            RoomAction::Leave => LEAVE_ROOM,
        }
    }
}

/// Waiter key for a room operation: room name plus the action it expects
pub fn room_ack_key(room: &str, action: &str) -> String {
    format!("{}:{}", room, action)
}

/// Unsolicited push event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    #[serde(default)]
    pub event: Value,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `pong` payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Pong {
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Serialize an outbound payload
pub fn encode<T: Serialize>(event: &str, payload: &T) -> Result<Value, SessionError> {
    serde_json::to_value(payload).map_err(|e| SessionError::malformed(event, e))
}

/// Decode an inbound payload; a missing payload decodes as `{}`
pub fn decode<T: DeserializeOwned>(event: &str, data: Option<Value>) -> Result<T, SessionError> {
    let value = data.unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(value).map_err(|e| SessionError::malformed(event, e))
}

/// Timestamps arrive either as epoch milliseconds or as RFC 3339 strings
mod timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => {
                let millis = match n.as_i64() {
                    Some(millis) => millis,
                    // Whole-valued floats only; fractions and overflow are rejected
                    None => n
                        .as_f64()
                        .filter(|f| {
                            f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64
                        })
                        .map(|f| f as i64)
                        .ok_or_else(|| D::Error::custom(format!("invalid timestamp {}", n)))?,
                };
                Utc.timestamp_millis_opt(millis)
                    .single()
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", millis)))
            }
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(D::Error::custom),
            Some(other) => Err(D::Error::custom(format!(
                "expected epoch millis or RFC 3339 string, got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requests_use_camel_case() {
        let auth = encode(
            AUTHENTICATE,
            &AuthenticateRequest {
                user_id: "u1",
                session_id: "s1",
            },
        )
        .unwrap();
        assert_eq!(auth, json!({ "userId": "u1", "sessionId": "s1" }));

        let sub = encode(SUBSCRIBE, &ChannelRequest { channel_name: "promo" }).unwrap();
        assert_eq!(sub, json!({ "channelName": "promo" }));

        let room = encode(JOIN_ROOM, &RoomRequest { room_name: "lobby" }).unwrap();
        assert_eq!(room, json!({ "roomName": "lobby" }));
    }

    #[test]
    fn test_custom_event_target_is_optional() {
        let event = json!({ "type": "cart_updated" });

        let untargeted = encode(CUSTOM_EVENT, &CustomEventRequest { event: &event, target: None }).unwrap();
        assert_eq!(untargeted, json!({ "event": { "type": "cart_updated" } }));

        let targeted = encode(
            CUSTOM_EVENT,
            &CustomEventRequest {
                event: &event,
                target: Some("orders"),
            },
        )
        .unwrap();
        assert_eq!(targeted["target"], "orders");
    }

    #[test]
    fn test_acks_default_to_failure() {
        let ack: AuthAck = decode(AUTHENTICATED, None).unwrap();
        assert!(!ack.success);

        let ack: RoomAck = decode(ROOM_RESULT, Some(json!({ "success": true, "roomName": "lobby" }))).unwrap();
        assert!(ack.success);
        assert!(ack.action.is_none());
    }

    #[test]
    fn test_wrong_payload_shape_is_malformed() {
        let err = decode::<ChannelAck>(SUBSCRIPTION_RESULT, Some(json!("ok"))).unwrap_err();
        assert!(matches!(err, SessionError::Malformed { ref event, .. } if event == SUBSCRIPTION_RESULT));
    }

    #[test]
    fn test_timestamps_accept_millis_and_rfc3339() {
        let from_millis: RealtimeEvent = decode(
            REALTIME_EVENT,
            Some(json!({ "event": { "type": "promo" }, "timestamp": 1700000000000u64 })),
        )
        .unwrap();
        let from_string: RealtimeEvent = decode(
            REALTIME_EVENT,
            Some(json!({ "event": { "type": "promo" }, "timestamp": "2023-11-14T22:13:20Z" })),
        )
        .unwrap();

        assert_eq!(from_millis.timestamp, from_string.timestamp);
        assert_eq!(from_millis.timestamp.unwrap().timestamp(), 1_700_000_000);

        let pong: Pong = decode(PONG, None).unwrap();
        assert!(pong.timestamp.is_none());

        assert!(decode::<Pong>(PONG, Some(json!({ "timestamp": true }))).is_err());
    }

    #[test]
    fn test_numeric_timestamps_must_be_whole_millis() {
        let whole: Pong = decode(PONG, Some(json!({ "timestamp": 1700000000000.0 }))).unwrap();
        assert_eq!(whole.timestamp.unwrap().timestamp(), 1_700_000_000);

        assert!(decode::<Pong>(PONG, Some(json!({ "timestamp": 1700000000000.5 }))).is_err());
        assert!(decode::<Pong>(PONG, Some(json!({ "timestamp": u64::MAX }))).is_err());
        assert!(decode::<Pong>(PONG, Some(json!({ "timestamp": 1e300 }))).is_err());
    }

    #[test]
    fn test_room_actions() {
        assert_eq!(RoomAction::Join.as_str(), "joined");
        assert_eq!(RoomAction::Leave.as_str(), "left");
        assert_eq!(RoomAction::Leave.request_event(), LEAVE_ROOM);
        assert_eq!(room_ack_key("lobby", RoomAction::Join.as_str()), "lobby:joined");
    }
}
