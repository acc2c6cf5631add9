//! Session domain entities

use crate::tool::entities::ToolCall;
use crate::tool::value_objects::ToolResult;
use serde::{Deserialize, Serialize};

/// Opaque session identifier assigned by the backend (or supplied on resume).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message in a conversation (Entity)
///
/// Assistant messages may carry tool calls; tool messages carry the id of
/// the call they answer. Once appended to a [`Transcript`](super::transcript::Transcript)
/// a message is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message requesting tool calls, with optional preamble text.
    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.filter(|c| !c.is_empty()),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool message answering a call. Carries only the model-visible text.
    pub fn tool(result: &ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.text_for_llm().to_string()),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.tool_call_id.clone()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// An assistant message with no pending tool calls ends a turn.
    pub fn is_terminal(&self) -> bool {
        self.role == Role::Assistant && self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::value_objects::{ToolContent, ToolFailure};

    #[test]
    fn test_assistant_with_tools_drops_empty_preamble() {
        let msg = Message::assistant_with_tools(
            Some(String::new()),
            vec![ToolCall::new("tc-1", "encrypt_string")],
        );
        assert!(msg.content.is_none());
        assert!(!msg.is_terminal());
    }

    #[test]
    fn test_plain_assistant_is_terminal() {
        assert!(Message::assistant("done").is_terminal());
        assert!(!Message::user("hi").is_terminal());
    }

    #[test]
    fn test_tool_message_uses_model_visible_text() {
        let ok = ToolResult::success("tc-1", "echo", ToolContent::text("HELLO"));
        let msg = Message::tool(&ok);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.text(), Some("HELLO"));
        assert_eq!(msg.tool_call_id.as_deref(), Some("tc-1"));

        let failed = ToolResult::failure("tc-2", "echo", ToolFailure::execution_failed());
        let msg = Message::tool(&failed);
        assert_eq!(msg.text(), Some("tool execution failed"));
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let msg = Message::tool(&ToolResult::success("tc-9", "t", ToolContent::text("x")));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["toolCallId"], "tc-9");
        assert!(json.get("toolCalls").is_none());
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new("sess-1");
        assert_eq!(id.to_string(), "sess-1");
        assert_eq!(id.as_str(), "sess-1");
        assert_eq!(SessionId::from("sess-1"), id);
    }
}
