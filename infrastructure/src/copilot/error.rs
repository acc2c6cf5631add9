//! Error types for the Copilot adapter

use harness_application::ConnectionError;
use thiserror::Error;

/// Result type alias for Copilot operations
pub type Result<T> = std::result::Result<T, CopilotError>;

/// Errors that can occur when communicating with Copilot CLI
#[derive(Error, Debug)]
pub enum CopilotError {
    #[error("Failed to spawn Copilot process: {0}")]
    SpawnError(#[from] std::io::Error),

    #[error("Copilot CLI not found: {0}")]
    CliNotFound(String),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("JSON-RPC error (code {code}): {message}")]
    RpcError { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Client is not connected")]
    NotConnected,

    #[error("Transport closed")]
    TransportClosed,

    /// The background reader ended; no further responses will arrive.
    #[error("Message router stopped")]
    RouterStopped,

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl From<CopilotError> for ConnectionError {
    fn from(err: CopilotError) -> Self {
        match err {
            CopilotError::SpawnError(e) => ConnectionError::Unavailable(e.to_string()),
            CopilotError::CliNotFound(msg) => ConnectionError::Unavailable(msg),
            CopilotError::NotConnected => ConnectionError::Unavailable("client not started".into()),
            CopilotError::TransportClosed | CopilotError::RouterStopped => ConnectionError::Closed,
            CopilotError::RpcError { code, message } => ConnectionError::Rpc { code, message },
            CopilotError::SessionNotFound(id) => ConnectionError::SessionNotFound(id),
            CopilotError::Timeout(msg) => ConnectionError::Timeout(msg),
            CopilotError::SerializationError(e) => ConnectionError::Protocol(e.to_string()),
            CopilotError::UnexpectedResponse(msg) => ConnectionError::Protocol(msg),
        }
    }
}
