//! Session creation and resume configuration.

use super::provider::ProviderConfig;
use crate::ports::permission_policy::PermissionPolicy;
use crate::ports::tool_handler::ToolRegistration;
use std::sync::Arc;
use std::time::Duration;

/// Turn timeout used when none is configured.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration fixed at session creation.
///
/// All fields are optional. Tool registrations and the permission policy
/// cannot change for the lifetime of the session.
///
/// Without a permission policy every gated action is answered with
/// `denied-no-approval-rule-and-could-not-request-from-user`.
#[derive(Clone)]
pub struct SessionConfig {
    /// Model identifier; the backend picks its default when `None`.
    pub model: Option<String>,
    pub tools: Vec<ToolRegistration>,
    /// Allow-list of built-in capability names.
    pub available_tools: Option<Vec<String>>,
    /// Built-in capability names to disable.
    pub excluded_tools: Option<Vec<String>>,
    pub system_message: Option<String>,
    pub provider: Option<ProviderConfig>,
    pub permission_policy: Option<Arc<dyn PermissionPolicy>>,
    /// Default wait bound for `send_and_wait`.
    pub turn_timeout: Duration,
    /// Ask the backend for `assistant.message_delta` events.
    pub streaming: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: None,
            tools: Vec::new(),
            available_tools: None,
            excluded_tools: None,
            system_message: None,
            provider: None,
            permission_policy: None,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            streaming: false,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Builder Methods ====================

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tool(mut self, tool: ToolRegistration) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_available_tools(mut self, names: Vec<String>) -> Self {
        self.available_tools = Some(names);
        self
    }

    pub fn with_excluded_tools(mut self, names: Vec<String>) -> Self {
        self.excluded_tools = Some(names);
        self
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_permission_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.permission_policy = Some(policy);
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("model", &self.model)
            .field("tools", &self.tool_names())
            .field("available_tools", &self.available_tools)
            .field("excluded_tools", &self.excluded_tools)
            .field("provider", &self.provider.as_ref().map(|p| &p.base_url))
            .field("has_permission_policy", &self.permission_policy.is_some())
            .field("turn_timeout", &self.turn_timeout)
            .field("streaming", &self.streaming)
            .finish()
    }
}

/// Configuration re-supplied when resuming a session by id.
///
/// Tools and the policy are in-process capabilities, so they cannot be
/// recovered from the backend and must be provided again.
#[derive(Clone)]
pub struct ResumeSessionConfig {
    pub tools: Vec<ToolRegistration>,
    pub provider: Option<ProviderConfig>,
    pub permission_policy: Option<Arc<dyn PermissionPolicy>>,
    pub turn_timeout: Duration,
    pub streaming: bool,
}

impl Default for ResumeSessionConfig {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            provider: None,
            permission_policy: None,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            streaming: false,
        }
    }
}

impl ResumeSessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: ToolRegistration) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_permission_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.permission_policy = Some(policy);
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

impl std::fmt::Debug for ResumeSessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeSessionConfig")
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("has_permission_policy", &self.permission_policy.is_some())
            .field("turn_timeout", &self.turn_timeout)
            .finish()
    }
}

impl From<SessionConfig> for ResumeSessionConfig {
    fn from(config: SessionConfig) -> Self {
        Self {
            tools: config.tools,
            provider: config.provider,
            permission_policy: config.permission_policy,
            turn_timeout: config.turn_timeout,
            streaming: config.streaming,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::permission_policy::ApproveAll;
    use crate::ports::tool_handler::{ToolOutput, ToolRegistration};
    use harness_domain::ToolDefinition;

    #[test]
    fn test_builder_and_resume_conversion() {
        let config = SessionConfig::new()
            .with_model("gpt-5")
            .with_tool(ToolRegistration::from_fn(
                ToolDefinition::new("noop", "does nothing"),
                |_inv, _args| async { Ok(ToolOutput::text("ok")) },
            ))
            .with_permission_policy(Arc::new(ApproveAll))
            .with_turn_timeout(Duration::from_secs(5));

        assert_eq!(config.tool_names(), vec!["noop"]);
        let resume: ResumeSessionConfig = config.into();
        assert_eq!(resume.tools.len(), 1);
        assert!(resume.permission_policy.is_some());
        assert_eq!(resume.turn_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.permission_policy.is_none());
        assert_eq!(config.turn_timeout, DEFAULT_TURN_TIMEOUT);
        assert!(format!("{:?}", config).contains("has_permission_policy: false"));
    }
}
