//! Application error types.
//!
//! [`ConnectionError`] is what an [`AgentConnection`](crate::ports::agent_connection::AgentConnection)
//! adapter reports. [`SessionError`] is the typed failure surface of the
//! session engine; callers branch on the variant, never on message text.

use std::time::Duration;
use thiserror::Error;

/// Errors reported by the backend connection port.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Channel closed")]
    Closed,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

/// Errors surfaced by [`Session`](crate::session::Session) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Turn timed out after {0:?}")]
    TurnTimedOut(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    /// The permission policy itself failed. The turn that hit it fails with
    /// this error; the session is unusable afterwards.
    #[error("Permission policy failed: {0}")]
    PermissionPolicy(String),

    /// Returned for every call on a session that has already failed.
    #[error("Session failed: {0}")]
    SessionFailed(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }

    /// The error later calls see once a session has ended with `self`.
    pub(crate) fn for_later_calls(&self) -> SessionError {
        match self {
            SessionError::PermissionPolicy(msg) => SessionError::SessionFailed(msg.clone()),
            other => other.clone(),
        }
    }
}

impl From<ConnectionError> for SessionError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Unavailable(msg) => SessionError::BackendUnavailable(msg),
            ConnectionError::Closed => SessionError::ChannelClosed,
            ConnectionError::SessionNotFound(id) => SessionError::SessionNotFound(id),
            ConnectionError::Rpc { code, message } => SessionError::Rpc { code, message },
            ConnectionError::Protocol(msg) => SessionError::Protocol(msg),
            ConnectionError::Timeout(msg) => SessionError::Protocol(format!("timeout: {}", msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_mapping() {
        assert_eq!(
            SessionError::from(ConnectionError::Closed),
            SessionError::ChannelClosed
        );
        assert_eq!(
            SessionError::from(ConnectionError::SessionNotFound("s1".into())),
            SessionError::SessionNotFound("s1".into())
        );
        assert!(matches!(
            SessionError::from(ConnectionError::Unavailable("refused".into())),
            SessionError::BackendUnavailable(_)
        ));
    }

    #[test]
    fn test_policy_failure_becomes_session_failed() {
        let err = SessionError::PermissionPolicy("boom".into());
        assert_eq!(
            err.for_later_calls(),
            SessionError::SessionFailed("boom".into())
        );
        assert_eq!(
            SessionError::ChannelClosed.for_later_calls(),
            SessionError::ChannelClosed
        );
    }
}
