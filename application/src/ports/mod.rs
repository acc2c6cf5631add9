//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters and application
//! code must implement.

pub mod agent_connection;
pub mod conversation_logger;
pub mod permission_policy;
pub mod session_history;
pub mod tool_handler;
