//! JSON-RPC protocol types for Copilot CLI communication.
//!
//! This module defines the message structures used in the JSON-RPC 2.0 protocol
//! for communicating with the Copilot CLI process.
//!
//! # Protocol Overview
//!
//! - **Requests**: Client → Copilot CLI (`session.create`, `session.resume`,
//!   `session.send`, `session.getMessages`, `session.abort`, `session.destroy`,
//!   `models.list`, `ping`)
//! - **Responses**: Copilot CLI → Client (result or error)
//! - **Notifications**: Copilot CLI → Client (`session.event`)
//! - **Incoming requests**: Copilot CLI → Client (`tool.call`,
//!   `permission.request`), answered with a response frame

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use harness_application::{Attachment, MessageOptions, ProviderConfig, SessionSpec};
use harness_domain::{
    BinaryContent, ParamType, PermissionRequest, SessionEvent, ToolDefinition, ToolFailureKind,
    ToolOutcome, ToolResult,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Method names.
pub mod methods {
    pub const SESSION_CREATE: &str = "session.create";
    pub const SESSION_RESUME: &str = "session.resume";
    pub const SESSION_SEND: &str = "session.send";
    pub const SESSION_GET_MESSAGES: &str = "session.getMessages";
    pub const SESSION_ABORT: &str = "session.abort";
    pub const SESSION_DESTROY: &str = "session.destroy";
    pub const SESSION_EVENT: &str = "session.event";
    pub const MODELS_LIST: &str = "models.list";
    pub const PING: &str = "ping";
    pub const TOOL_CALL: &str = "tool.call";
    pub const PERMISSION_REQUEST: &str = "permission.request";
}

/// JSON-RPC error code for an incoming request we cannot route.
pub const UNKNOWN_SESSION_CODE: i64 = -32001;
/// JSON-RPC error code for an incoming request we failed to serve.
pub const REQUEST_FAILED_CODE: i64 = -32603;

/// Global request ID counter for JSON-RPC requests.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generates a unique request ID.
fn next_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with an auto-generated ID.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: next_id(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    /// Split into the result value or the error object.
    pub fn into_result(self) -> std::result::Result<serde_json::Value, RpcError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(serde_json::Value::Null),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Notification from server (`session.event`)
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    pub method: String,
    pub params: Option<serde_json::Value>,
}

/// An incoming JSON-RPC request from the Copilot CLI (has `id` + `method`).
///
/// The id is echoed back verbatim, so any JSON value is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingJsonRpcRequest {
    pub id: serde_json::Value,
    pub method: String,
    pub params: Option<serde_json::Value>,
}

/// JSON-RPC response sent from client → CLI (e.g., `tool.call` result).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponseOut {
    pub jsonrpc: &'static str,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponseOut {
    pub fn new(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

// ==================== Session requests ====================

/// Tool definition sent to the Copilot CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopilotToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl CopilotToolDefinition {
    /// Convert a tool definition into a JSON Schema object descriptor.
    pub fn from_definition(tool: &ToolDefinition) -> Self {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &tool.parameters {
            let mut prop = serde_json::Map::new();
            prop.insert("type".to_string(), serde_json::json!(param.param_type.as_str()));
            prop.insert(
                "description".to_string(),
                serde_json::json!(param.description),
            );
            if param.param_type == ParamType::Array {
                prop.insert("items".to_string(), serde_json::json!({}));
            }
            properties.insert(param.name.clone(), serde_json::Value::Object(prop));

            if param.required {
                required.push(serde_json::json!(param.name));
            }
        }

        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// BYOK provider block.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderParams {
    #[serde(rename = "type")]
    pub provider_type: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wire_api: Option<String>,
}

impl From<&ProviderConfig> for ProviderParams {
    fn from(provider: &ProviderConfig) -> Self {
        Self {
            provider_type: provider.provider_type.clone(),
            base_url: provider.base_url.clone(),
            api_key: provider.api_key.clone(),
            wire_api: provider.wire_api.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessageParams {
    pub mode: &'static str,
    pub content: String,
}

/// Session creation parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<CopilotToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<SystemMessageParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderParams>,
    pub streaming: bool,
    /// Ask the CLI to route permission decisions to us.
    pub request_permission: bool,
}

impl From<&SessionSpec> for CreateSessionParams {
    fn from(spec: &SessionSpec) -> Self {
        Self {
            model: spec.model.clone(),
            tools: spec
                .tools
                .iter()
                .map(CopilotToolDefinition::from_definition)
                .collect(),
            available_tools: spec.available_tools.clone(),
            excluded_tools: spec.excluded_tools.clone(),
            system_message: spec.system_message.as_ref().map(|content| SystemMessageParams {
                mode: "append",
                content: content.clone(),
            }),
            provider: spec.provider.as_ref().map(ProviderParams::from),
            streaming: spec.streaming,
            request_permission: true,
        }
    }
}

/// Session resume parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSessionParams {
    pub session_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<CopilotToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderParams>,
    pub streaming: bool,
    pub request_permission: bool,
}

impl ResumeSessionParams {
    pub fn new(session_id: &str, spec: &SessionSpec) -> Self {
        Self {
            session_id: session_id.to_string(),
            tools: spec
                .tools
                .iter()
                .map(CopilotToolDefinition::from_definition)
                .collect(),
            provider: spec.provider.as_ref().map(ProviderParams::from),
            streaming: spec.streaming,
            request_permission: true,
        }
    }
}

/// Session creation / resume result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResult {
    pub session_id: String,
}

/// Parameters carrying only a session id (`session.abort`, `session.destroy`,
/// `session.getMessages`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdParams {
    pub session_id: String,
}

/// Send parameters (for `session.send`)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendParams {
    pub session_id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl SendParams {
    pub fn new(session_id: &str, options: &MessageOptions) -> Self {
        Self {
            session_id: session_id.to_string(),
            prompt: options.prompt.clone(),
            attachments: options.attachments.clone(),
            mode: options.mode.clone(),
        }
    }
}

/// `session.getMessages` result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetMessagesResult {
    #[serde(default)]
    pub events: Vec<SessionEvent>,
}

/// Session event params (from `session.event` notification)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventParams {
    pub session_id: String,
    pub event: SessionEvent,
}

// ==================== Models / ping ====================

/// A model the backend offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListModelsResult {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub protocol_version: Option<u32>,
}

// ==================== Incoming requests ====================

/// Parameters for a `tool.call` request from the Copilot CLI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallParams {
    pub session_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Parameters for a `permission.request` request from the Copilot CLI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequestParams {
    pub session_id: String,
    pub permission_request: PermissionRequest,
}

/// Binary attachment of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryResult {
    /// Base64-encoded bytes.
    pub data: String,
    pub mime_type: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&BinaryContent> for BinaryResult {
    fn from(binary: &BinaryContent) -> Self {
        Self {
            data: BASE64.encode(&binary.data),
            mime_type: binary.mime_type.clone(),
            kind: binary.kind.clone(),
            description: binary.description.clone(),
        }
    }
}

/// Result payload for a `tool.call` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// The text result that the LLM should see.
    pub text_result_for_llm: String,
    /// `"success"`, `"failure"` or `"denied"`.
    pub result_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary_results_for_llm: Vec<BinaryResult>,
}

impl From<&ToolResult> for ToolCallResult {
    fn from(result: &ToolResult) -> Self {
        match &result.outcome {
            ToolOutcome::Success(content) => Self {
                text_result_for_llm: content.text.clone(),
                result_type: "success".to_string(),
                error: None,
                binary_results_for_llm: content.binary.iter().map(BinaryResult::from).collect(),
            },
            ToolOutcome::Failure(failure) => {
                let result_type = match failure.kind() {
                    ToolFailureKind::PermissionDenied { .. } => "denied",
                    _ => "failure",
                };
                Self {
                    text_result_for_llm: failure.message().to_string(),
                    result_type: result_type.to_string(),
                    error: Some(failure.kind().code().to_string()),
                    binary_results_for_llm: Vec::new(),
                }
            }
        }
    }
}

impl ToolCallResult {
    /// Wrap as the `result` of a `tool.call` response.
    pub fn into_rpc_value(self) -> serde_json::Value {
        serde_json::json!({ "result": self })
    }
}
