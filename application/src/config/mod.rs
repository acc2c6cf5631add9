//! Application-level configuration.
//!
//! This module provides the configuration types the session engine is
//! driven by:
//!
//! - [`SessionConfig`]: everything fixed at session creation
//! - [`ResumeSessionConfig`]: the subset re-supplied when resuming
//! - [`MessageOptions`]: one prompt submission
//! - [`ProviderConfig`]: bring-your-own-key model provider pass-through

pub mod message_options;
pub mod provider;
pub mod session_config;

pub use message_options::{Attachment, AttachmentKind, MessageOptions};
pub use provider::ProviderConfig;
pub use session_config::{DEFAULT_TURN_TIMEOUT, ResumeSessionConfig, SessionConfig};
