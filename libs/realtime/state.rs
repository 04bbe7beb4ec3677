//! Session state record
//!
//! `ConnectionState` is never mutated in place by the manager: every
//! transition builds the next record from the previous one and swaps it in
//! under the write lock.

use serde::Serialize;

/// Connection, authentication and membership state of one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Transport-level socket is open
    pub is_connected: bool,
    /// Server accepted the identity handshake on this socket
    pub is_authenticated: bool,
    /// Server-assigned id, present only while authenticated
    pub connection_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Subscribed channels, in acknowledgment order
    pub channels: Vec<String>,
    /// Joined rooms, in acknowledgment order
    pub rooms: Vec<String>,
}

/// The two booleans reported by `get_status()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub is_connected: bool,
    pub is_authenticated: bool,
}

impl ConnectionState {
    pub fn status(&self) -> Status {
        Status {
            is_connected: self.is_connected,
            is_authenticated: self.is_authenticated,
        }
    }

    /// Transport connected; a fresh socket carries no authentication or memberships
    pub fn connected(&self) -> Self {
        Self {
            is_connected: true,
            is_authenticated: false,
            connection_id: None,
            channels: Vec::new(),
            rooms: Vec::new(),
            ..self.clone()
        }
    }

    /// Transport gone: connection, authentication and memberships reset.
    /// The identity is kept so it can be reused on the next connection.
    pub fn disconnected(&self) -> Self {
        Self {
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            ..Self::default()
        }
    }

    pub fn authenticated(&self, connection_id: String, user_id: String, session_id: String) -> Self {
        Self {
            is_authenticated: true,
            connection_id: Some(connection_id),
            user_id: Some(user_id),
            session_id: Some(session_id),
            ..self.clone()
        }
    }

    pub fn with_channel(&self, channel: &str) -> Self {
        Self {
            channels: with_name(&self.channels, channel),
            ..self.clone()
        }
    }

    pub fn without_channel(&self, channel: &str) -> Self {
        Self {
            channels: without_name(&self.channels, channel),
            ..self.clone()
        }
    }

    pub fn with_room(&self, room: &str) -> Self {
        Self {
            rooms: with_name(&self.rooms, room),
            ..self.clone()
        }
    }

    pub fn without_room(&self, room: &str) -> Self {
        Self {
            rooms: without_name(&self.rooms, room),
            ..self.clone()
        }
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    pub fn has_room(&self, room: &str) -> bool {
        self.rooms.iter().any(|r| r == room)
    }
}

fn with_name(names: &[String], name: &str) -> Vec<String> {
    let mut next = names.to_vec();
    if !next.iter().any(|n| n == name) {
        next.push(name.to_string());
    }
    next
}

fn without_name(names: &[String], name: &str) -> Vec<String> {
    names.iter().filter(|n| *n != name).cloned().collect()
}
