//! Application layer for copilot-harness
//!
//! This crate contains the session engine, tool dispatch, the permission
//! gate, and the port definitions adapters implement.
//! It depends only on the domain layer.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod permission;
pub mod ports;
pub mod session;

// Re-export commonly used types
pub use config::{
    Attachment, AttachmentKind, DEFAULT_TURN_TIMEOUT, MessageOptions, ProviderConfig,
    ResumeSessionConfig, SessionConfig,
};
pub use dispatch::ToolDispatcher;
pub use error::{ConnectionError, SessionError};
pub use permission::{GateError, PermissionGate};
pub use ports::{
    agent_connection::{
        AgentConnection, InboundEvent, OutboundReply, Reply, RequestId, SessionLink, SessionSpec,
    },
    conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger},
    permission_policy::{ApproveAll, DenyAll, PermissionPolicy, PolicyError},
    session_history::SessionHistoryStore,
    tool_handler::{ToolError, ToolHandler, ToolInvocation, ToolOutput, ToolRegistration},
};
pub use session::{Session, SessionContext};
