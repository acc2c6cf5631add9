//! Tool domain module
//!
//! Tools are functions registered by the application that the model may
//! call during a turn. The flow is:
//!
//! ```text
//! ┌────────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ ToolDefinition │───▶│ ToolCall     │───▶│ ToolResult   │
//! │ (registered)   │    │ (backend id) │    │ (one per id) │
//! └────────────────┘    └──────────────┘    └──────────────┘
//! ```
//!
//! - [`ToolDefinition`]: name, description and argument shape descriptor
//! - [`ToolCall`]: a backend-issued invocation with untyped arguments
//! - [`ToolResult`]: success content or an opaque [`ToolFailure`]
//! - [`ToolValidator`]: pure argument shape validation
//!
//! The async handler port and the dispatcher live in the application layer.

pub mod entities;
pub mod traits;
pub mod value_objects;

pub use entities::{ParamType, ToolCall, ToolDefinition, ToolParameter};
pub use traits::{DefaultToolValidator, ToolValidator};
pub use value_objects::{
    BinaryContent, ToolContent, ToolFailure, ToolFailureKind, ToolOutcome, ToolResult,
};
