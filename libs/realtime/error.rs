use thiserror::Error;

/// Errors reported on the session event stream
///
/// Operations themselves only ever resolve to `bool`; these values carry the
/// detail to whoever watches `SessionEvent::Error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Transport-level failure, surfaced verbatim
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server acknowledged a request with `success: false`
    #[error("{operation} rejected: {message}")]
    Rejected { operation: String, message: String },

    /// Inbound payload did not match the wire contract
    #[error("Malformed '{event}' payload: {reason}")]
    Malformed { event: String, reason: String },
}

impl SessionError {
    pub fn rejected(operation: &str, message: Option<String>) -> Self {
        Self::Rejected {
            operation: operation.to_string(),
            message: message.unwrap_or_else(|| "no reason given".to_string()),
        }
    }

    pub fn malformed(event: &str, reason: impl ToString) -> Self {
        Self::Malformed {
            event: event.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<pushsockets::SocketError> for SessionError {
    fn from(err: pushsockets::SocketError) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_message_fallback() {
        let err = SessionError::rejected("subscribe", None);
        assert_eq!(err.to_string(), "subscribe rejected: no reason given");

        let err = SessionError::rejected("authenticate", Some("bad session".into()));
        assert_eq!(err.to_string(), "authenticate rejected: bad session");
    }

    #[test]
    fn test_socket_errors_become_transport_errors() {
        let err: SessionError = pushsockets::SocketError::WebSocket("refused".into()).into();
        assert_eq!(err, SessionError::Transport("WebSocket error: refused".into()));
    }
}
