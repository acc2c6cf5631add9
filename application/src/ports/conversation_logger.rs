//! Port for structured conversation logging.
//!
//! Defines the [`ConversationLogger`] trait for recording session events
//! (tool calls, tool results, permission decisions, completed turns) to a
//! structured log.
//!
//! This is separate from `tracing`-based operation logs: tracing handles
//! human-readable diagnostic messages, while this port captures what the
//! model saw in a machine-readable format (JSONL). Handler failure detail
//! goes to tracing only, never through this port.

use serde_json::Value;

/// Event type names recorded by the session engine.
pub mod event_types {
    pub const TOOL_CALL: &str = "tool_call";
    pub const TOOL_RESULT: &str = "tool_result";
    pub const PERMISSION_DECISION: &str = "permission_decision";
    pub const TURN_COMPLETE: &str = "turn_complete";
}

/// A structured conversation event for logging.
///
/// Each event has a type string and a JSON payload containing
/// event-specific fields. Implementations add the timestamp.
pub struct ConversationEvent {
    /// Event type identifier (e.g., "tool_call", "permission_decision").
    pub event_type: &'static str,
    /// JSON payload with event-specific data.
    pub payload: Value,
}

impl ConversationEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}

/// Port for logging conversation events to a structured log.
///
/// Implementations write each event as a single record (e.g., one JSONL line).
/// The `log` method is synchronous and non-fallible so logging never
/// disrupts a turn; failures are ignored by implementations.
pub trait ConversationLogger: Send + Sync {
    /// Record a conversation event.
    fn log(&self, event: ConversationEvent);
}

/// No-op implementation for tests and when logging is disabled.
pub struct NoConversationLogger;

impl ConversationLogger for NoConversationLogger {
    fn log(&self, _event: ConversationEvent) {}
}
