//! Permission domain.
//!
//! Every registered tool invocation and every built-in capability the
//! backend wants to use is described by a [`PermissionRequest`] and must
//! receive exactly one [`PermissionDecision`] before it executes.

pub mod entities;

pub use entities::{PermissionDecision, PermissionInvocation, PermissionKind, PermissionRequest};
