//! Domain error types

use thiserror::Error;

/// Domain-level errors
///
/// These are raised when an operation would break a transcript or turn
/// invariant. The session engine treats them as protocol errors: the
/// offending frame is logged and dropped, the session keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Tool call id already used in this session: {0}")]
    DuplicateToolCallId(String),

    #[error("Tool result references an unknown tool call: {0}")]
    UnknownToolCallId(String),

    #[error("Tool call already answered: {0}")]
    ToolCallAlreadyAnswered(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid turn transition: {event} while {from}")]
    InvalidTurnTransition { from: String, event: &'static str },

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_error_display() {
        let error = DomainError::Cancelled;
        assert_eq!(error.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_is_cancelled_check() {
        assert!(DomainError::Cancelled.is_cancelled());
        assert!(!DomainError::DuplicateToolCallId("tc-1".to_string()).is_cancelled());
    }

    #[test]
    fn test_transition_error_display() {
        let error = DomainError::InvalidTurnTransition {
            from: "idle".to_string(),
            event: "session.idle",
        };
        assert_eq!(
            error.to_string(),
            "Invalid turn transition: session.idle while idle"
        );
    }
}
