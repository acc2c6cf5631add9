//! Infrastructure layer for copilot-harness
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: the Copilot CLI connection, configuration
//! file loading and the JSONL conversation log.

pub mod config;
pub mod copilot;
pub mod logging;

// Re-export commonly used types
pub use config::{
    ConfigLoader, ConfigValidationError, FileClientConfig, FileConfig, FileLoggingConfig,
    FileProviderConfig, FileSessionConfig,
};
pub use copilot::{
    ClientOptions, ClientState, CopilotClient, MessageRouter, ModelInfo, PingResult,
    error::{CopilotError, Result},
};
pub use logging::JsonlConversationLogger;
