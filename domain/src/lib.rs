//! Domain layer for copilot-harness
//!
//! This crate contains the core entities, value objects and invariants of
//! the session protocol. It has no dependencies on async runtimes,
//! transports or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Session
//!
//! A session is one conversation with the agent backend. Its history lives
//! in an append-only [`Transcript`] and each prompt drives one turn through
//! the [`TurnPhase`] state machine.
//!
//! ## Tools and permissions
//!
//! - **Tools**: functions the model may call, described by a [`ToolDefinition`]
//! - **Tool results**: exactly one [`ToolResult`] per [`ToolCall`]; failures
//!   carry only a [`ToolFailureKind`] and generic text
//! - **Permissions**: every invocation needs an approved [`PermissionDecision`]

pub mod core;
pub mod permission;
pub mod session;
pub mod tool;

// Re-export commonly used types
pub use core::error::DomainError;
pub use permission::{PermissionDecision, PermissionInvocation, PermissionKind, PermissionRequest};
pub use session::{
    entities::{Message, Role, SessionId},
    event::{SessionEvent, kinds as event_kinds},
    transcript::Transcript,
    turn::TurnPhase,
};
pub use tool::{
    entities::{ParamType, ToolCall, ToolDefinition, ToolParameter},
    traits::{DefaultToolValidator, ToolValidator},
    value_objects::{
        BinaryContent, EXECUTION_FAILED_MESSAGE, ToolContent, ToolFailure, ToolFailureKind,
        ToolOutcome, ToolResult,
    },
};
