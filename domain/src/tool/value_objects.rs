//! Tool domain value objects: immutable result and failure types
//!
//! Every dispatched [`ToolCall`](super::entities::ToolCall) produces exactly
//! one [`ToolResult`]. Failures are built only from a [`ToolFailureKind`]
//! plus text this crate generates; there is no constructor that accepts a
//! handler's error, so handler internals cannot reach the model-visible
//! transcript through a failure path.

use crate::permission::entities::PermissionDecision;
use serde::{Deserialize, Serialize};

/// Generic text the model sees when a handler fails.
pub const EXECUTION_FAILED_MESSAGE: &str = "tool execution failed";

/// Why a tool call did not produce a success payload.
///
/// | Kind | Handler invoked? |
/// |------|-----------------|
/// | `UnknownTool` | No (no permission check either) |
/// | `PermissionDenied` | No |
/// | `BadToolArguments` | No |
/// | `ExecutionFailed` | Yes, and it failed or panicked |
/// | `Cancelled` | Maybe; the session closed before it finished |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolFailureKind {
    UnknownTool,
    PermissionDenied { decision: PermissionDecision },
    BadToolArguments,
    ExecutionFailed,
    Cancelled,
}

impl ToolFailureKind {
    pub fn code(&self) -> &str {
        match self {
            ToolFailureKind::UnknownTool => "UNKNOWN_TOOL",
            ToolFailureKind::PermissionDenied { .. } => "PERMISSION_DENIED",
            ToolFailureKind::BadToolArguments => "BAD_TOOL_ARGUMENTS",
            ToolFailureKind::ExecutionFailed => "EXECUTION_FAILED",
            ToolFailureKind::Cancelled => "CANCELLED",
        }
    }
}

/// Model-visible failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    kind: ToolFailureKind,
    message: String,
}

impl ToolFailure {
    pub fn unknown_tool(tool_name: &str) -> Self {
        Self {
            kind: ToolFailureKind::UnknownTool,
            message: format!("Tool '{}' is not supported by this client", tool_name),
        }
    }

    pub fn permission_denied(decision: PermissionDecision) -> Self {
        Self {
            message: format!("Permission denied: {}", decision.as_str()),
            kind: ToolFailureKind::PermissionDenied { decision },
        }
    }

    /// `reason` must come from descriptor validation, never from a handler.
    pub fn bad_arguments(tool_name: &str, reason: impl Into<String>) -> Self {
        Self {
            kind: ToolFailureKind::BadToolArguments,
            message: format!("Invalid arguments for tool '{}': {}", tool_name, reason.into()),
        }
    }

    pub fn execution_failed() -> Self {
        Self {
            kind: ToolFailureKind::ExecutionFailed,
            message: EXECUTION_FAILED_MESSAGE.to_string(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: ToolFailureKind::Cancelled,
            message: "tool execution cancelled".to_string(),
        }
    }

    pub fn kind(&self) -> &ToolFailureKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)
    }
}

/// Non-text payload attached to a tool result (e.g. an image).
///
/// Carried on a separate channel from the text and tagged with a MIME type.
/// How the backend surfaces these to the model is not settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryContent {
    pub data: Vec<u8>,
    pub mime_type: String,
    /// Payload category, e.g. `"image"` or `"resource"`.
    pub kind: String,
    pub description: Option<String>,
}

impl BinaryContent {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let kind = if mime_type.starts_with("image/") {
            "image"
        } else {
            "resource"
        };
        Self {
            data,
            mime_type,
            kind: kind.to_string(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Success payload: text for the model plus optional binary attachments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary: Vec<BinaryContent>,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            binary: Vec::new(),
        }
    }

    pub fn with_binary(mut self, binary: BinaryContent) -> Self {
        self.binary.push(binary);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(ToolContent),
    Failure(ToolFailure),
}

/// Result of a tool call, correlated by `tool_call_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
    /// Wall-clock time spent in the handler, if it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolResult {
    pub fn success(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: ToolContent,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Success(content),
            duration_ms: None,
        }
    }

    pub fn failure(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        failure: ToolFailure,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Failure(failure),
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    pub fn content(&self) -> Option<&ToolContent> {
        match &self.outcome {
            ToolOutcome::Success(content) => Some(content),
            ToolOutcome::Failure(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<&ToolFailureKind> {
        match &self.outcome {
            ToolOutcome::Success(_) => None,
            ToolOutcome::Failure(failure) => Some(failure.kind()),
        }
    }

    /// The text the model sees for this result.
    pub fn text_for_llm(&self) -> &str {
        match &self.outcome {
            ToolOutcome::Success(content) => &content.text,
            ToolOutcome::Failure(failure) => failure.message(),
        }
    }
}
