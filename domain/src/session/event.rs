//! Session events emitted by the backend.
//!
//! The backend reports everything that happens inside a session as a typed
//! event (`assistant.message`, `assistant.message_delta`, `session.idle`,
//! `tool.execution_start`, ...). [`SessionEvent`] keeps the raw type string
//! and data payload so unknown event kinds pass through to subscribers, and
//! offers accessors for the handful the engine interprets.

use crate::tool::entities::ToolCall;
use serde::{Deserialize, Serialize};

/// Well-known event type names.
pub mod kinds {
    pub const ASSISTANT_MESSAGE: &str = "assistant.message";
    pub const ASSISTANT_MESSAGE_DELTA: &str = "assistant.message_delta";
    pub const ASSISTANT_MESSAGE_DELTA_DOTTED: &str = "assistant.message.delta";
    pub const ASSISTANT_REASONING: &str = "assistant.reasoning";
    pub const ASSISTANT_TURN_START: &str = "assistant.turn_start";
    pub const ASSISTANT_TURN_END: &str = "assistant.turn_end";
    pub const USER_MESSAGE: &str = "user.message";
    pub const TOOL_EXECUTION_START: &str = "tool.execution_start";
    pub const TOOL_EXECUTION_COMPLETE: &str = "tool.execution_complete";
    pub const SESSION_IDLE: &str = "session.idle";
    pub const SESSION_ERROR: &str = "session.error";
    pub const SESSION_START: &str = "session.start";
    /// The running turn was aborted.
    pub const ABORT: &str = "abort";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SessionEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    pub fn is(&self, kind: &str) -> bool {
        self.event_type == kind
    }

    /// `data.content` or `data.deltaContent` as a string, when non-empty.
    pub fn content(&self) -> Option<&str> {
        self.data
            .get("content")
            .or_else(|| self.data.get("deltaContent"))
            .and_then(|c| c.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Tool requests announced by an `assistant.message` event.
    ///
    /// Entries without an id or name are skipped; missing arguments become
    /// an empty object.
    pub fn tool_requests(&self) -> Vec<ToolCall> {
        let Some(requests) = self.data.get("toolRequests").and_then(|r| r.as_array()) else {
            return Vec::new();
        };

        requests
            .iter()
            .filter_map(|req| {
                let id = req.get("toolCallId").and_then(|v| v.as_str())?;
                let name = req
                    .get("name")
                    .or_else(|| req.get("toolName"))
                    .and_then(|v| v.as_str())?;
                let arguments = req
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));
                Some(ToolCall::new(id, name).with_arguments(arguments))
            })
            .collect()
    }

    /// `data.message` for `session.error` events.
    pub fn error_message(&self) -> Option<&str> {
        self.data.get("message").and_then(|m| m.as_str())
    }

    /// `data.toolName` (or `data.name`) for tool execution events.
    pub fn tool_name(&self) -> Option<&str> {
        self.data
            .get("toolName")
            .or_else(|| self.data.get("name"))
            .and_then(|v| v.as_str())
    }
}
