//! Permission domain entities

use crate::session::entities::SessionId;
use crate::tool::entities::ToolCall;
use serde::{Deserialize, Serialize};

/// Category of capability a permission request is about.
///
/// The backend may send kinds this client does not know; they are kept
/// verbatim in [`PermissionKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionKind {
    Shell,
    Write,
    Read,
    Url,
    Mcp,
    CustomTool,
    Other(String),
}

impl PermissionKind {
    pub fn as_str(&self) -> &str {
        match self {
            PermissionKind::Shell => "shell",
            PermissionKind::Write => "write",
            PermissionKind::Read => "read",
            PermissionKind::Url => "url",
            PermissionKind::Mcp => "mcp",
            PermissionKind::CustomTool => "custom-tool",
            PermissionKind::Other(kind) => kind,
        }
    }
}

impl From<String> for PermissionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "shell" => PermissionKind::Shell,
            "write" => PermissionKind::Write,
            "read" => PermissionKind::Read,
            "url" => PermissionKind::Url,
            "mcp" => PermissionKind::Mcp,
            "custom-tool" => PermissionKind::CustomTool,
            _ => PermissionKind::Other(s),
        }
    }
}

impl From<PermissionKind> for String {
    fn from(kind: PermissionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to approve one capability use.
///
/// Built by the dispatcher for registered tools (`custom-tool`) or received
/// from the backend for its built-in capabilities. Fields the client does
/// not model are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub kind: PermissionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub arguments: serde_json::Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PermissionRequest {
    pub fn new(kind: PermissionKind) -> Self {
        Self {
            kind,
            tool_call_id: None,
            tool_name: None,
            arguments: serde_json::Value::Null,
            extra: serde_json::Map::new(),
        }
    }

    /// Request covering one invocation of a registered tool.
    pub fn custom_tool(call: &ToolCall) -> Self {
        Self {
            kind: PermissionKind::CustomTool,
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.tool_name.clone()),
            arguments: call.arguments.clone(),
            extra: serde_json::Map::new(),
        }
    }

    /// Short human-readable label, e.g. `custom-tool:encrypt_string`.
    pub fn summary(&self) -> String {
        match &self.tool_name {
            Some(name) => format!("{}:{}", self.kind, name),
            None => self.kind.to_string(),
        }
    }
}

/// Outcome of a permission request. Serialized as `{"kind": "..."}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PermissionDecision {
    Approved,
    DeniedInteractivelyByUser,
    DeniedByRules,
    #[serde(rename = "denied-no-approval-rule-and-could-not-request-from-user")]
    DeniedNoApprovalRule,
}

impl PermissionDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, PermissionDecision::Approved)
    }

    pub fn as_str(&self) -> &str {
        match self {
            PermissionDecision::Approved => "approved",
            PermissionDecision::DeniedInteractivelyByUser => "denied-interactively-by-user",
            PermissionDecision::DeniedByRules => "denied-by-rules",
            PermissionDecision::DeniedNoApprovalRule => {
                "denied-no-approval-rule-and-could-not-request-from-user"
            }
        }
    }
}

impl std::fmt::Display for PermissionDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the invocation a permission request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionInvocation {
    pub session_id: SessionId,
    pub tool_call_id: Option<String>,
}
