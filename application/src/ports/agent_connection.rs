//! Agent connection port
//!
//! Defines the interface the session engine uses to talk to the agent
//! backend. One connection is shared by every session of a client; the
//! adapter demultiplexes inbound traffic and hands each session its own
//! ordered [`InboundEvent`] stream through a [`SessionLink`].

use crate::config::{MessageOptions, ProviderConfig, ResumeSessionConfig, SessionConfig};
use crate::error::ConnectionError;
use async_trait::async_trait;
use harness_domain::{
    PermissionDecision, PermissionRequest, SessionEvent, SessionId, ToolCall, ToolDefinition,
    ToolResult,
};
use tokio::sync::mpsc;

/// Correlation id of a request the backend sent to us.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestId(pub serde_json::Value);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(serde_json::Value::from(id))
    }
}

/// A message the backend sent for one session, in receipt order.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A session event notification (assistant message, idle, ...).
    Event(SessionEvent),
    /// The backend asks us to run a registered tool.
    ToolCall { request_id: RequestId, call: ToolCall },
    /// The backend asks for approval of a built-in capability.
    Permission {
        request_id: RequestId,
        request: PermissionRequest,
    },
}

/// Body of a reply to a backend request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    ToolResult(ToolResult),
    Permission(PermissionDecision),
    /// The request could not be served (duplicate call, broken policy).
    Failure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundReply {
    pub request_id: RequestId,
    pub reply: Reply,
}

impl OutboundReply {
    pub fn new(request_id: RequestId, reply: Reply) -> Self {
        Self { request_id, reply }
    }
}

/// What the backend needs to know to host a session.
#[derive(Debug, Clone, Default)]
pub struct SessionSpec {
    pub model: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub available_tools: Option<Vec<String>>,
    pub excluded_tools: Option<Vec<String>>,
    pub system_message: Option<String>,
    pub provider: Option<ProviderConfig>,
    pub streaming: bool,
}

impl From<&SessionConfig> for SessionSpec {
    fn from(config: &SessionConfig) -> Self {
        Self {
            model: config.model.clone(),
            tools: config.tools.iter().map(|t| t.definition().clone()).collect(),
            available_tools: config.available_tools.clone(),
            excluded_tools: config.excluded_tools.clone(),
            system_message: config.system_message.clone(),
            provider: config.provider.clone(),
            streaming: config.streaming,
        }
    }
}

impl From<&ResumeSessionConfig> for SessionSpec {
    fn from(config: &ResumeSessionConfig) -> Self {
        Self {
            tools: config.tools.iter().map(|t| t.definition().clone()).collect(),
            provider: config.provider.clone(),
            streaming: config.streaming,
            ..Self::default()
        }
    }
}

/// A registered session: its id and its private inbound stream.
///
/// The stream ends (`recv` returns `None`) when the channel closes.
pub struct SessionLink {
    pub session_id: SessionId,
    pub inbound: mpsc::UnboundedReceiver<InboundEvent>,
}

/// Port for the shared backend connection.
///
/// Implementations serialize writes (one in-flight frame at a time) and
/// pump reads continuously from a single task.
#[async_trait]
pub trait AgentConnection: Send + Sync {
    /// Create a session and register its inbound route.
    async fn create_session(&self, spec: &SessionSpec) -> Result<SessionLink, ConnectionError>;

    /// Re-attach to an existing session and register its inbound route.
    ///
    /// Fails with [`ConnectionError::SessionNotFound`] when the backend does
    /// not know the id.
    async fn resume_session(
        &self,
        session_id: &SessionId,
        spec: &SessionSpec,
    ) -> Result<SessionLink, ConnectionError>;

    /// Transmit a prompt. Returns once the backend accepted it.
    async fn send_prompt(
        &self,
        session_id: &SessionId,
        options: &MessageOptions,
    ) -> Result<(), ConnectionError>;

    /// Write every reply as one uninterrupted batch.
    async fn respond(&self, replies: Vec<OutboundReply>) -> Result<(), ConnectionError>;

    /// Abort the turn currently running in the session.
    async fn abort(&self, session_id: &SessionId) -> Result<(), ConnectionError>;

    /// Release the session on the backend.
    async fn destroy_session(&self, session_id: &SessionId) -> Result<(), ConnectionError>;

    /// Drop the local inbound route once its receiver has been dropped or
    /// closed. Later traffic for the id is treated as an unknown session.
    fn release_session(&self, session_id: &SessionId);
}
