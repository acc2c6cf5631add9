//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file:
//!
//! ```toml
//! [client]
//! cli_url = "127.0.0.1:4321"
//!
//! [session]
//! model = "gpt-5"
//! turn_timeout_seconds = 120
//!
//! [provider]
//! type = "openai"
//! base_url = "http://localhost:11434/v1"
//! api_key_env = "OLLAMA_KEY"
//!
//! [logging]
//! conversation_log = "~/.local/share/copilot-harness/conversation.jsonl"
//! ```

mod client;
mod logging;
mod provider;
mod session;

pub use client::FileClientConfig;
pub use logging::FileLoggingConfig;
pub use provider::FileProviderConfig;
pub use session::FileSessionConfig;

use harness_application::SessionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("{0} cannot be 0")]
    ZeroTimeout(&'static str),

    #[error("session.model cannot be empty")]
    EmptyModelName,

    #[error("client.cli_url must be host:port, got '{0}'")]
    InvalidCliUrl(String),

    #[error("client.cli_path and client.cli_url are mutually exclusive")]
    ConflictingCliSource,

    #[error("provider.{0} cannot be empty")]
    EmptyProviderField(&'static str),
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub client: FileClientConfig,
    pub session: FileSessionConfig,
    /// Optional bring-your-own-key provider
    pub provider: Option<FileProviderConfig>,
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Check the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.client.spawn_timeout_seconds == 0 {
            return Err(ConfigValidationError::ZeroTimeout(
                "client.spawn_timeout_seconds",
            ));
        }
        if self.client.request_timeout_seconds == 0 {
            return Err(ConfigValidationError::ZeroTimeout(
                "client.request_timeout_seconds",
            ));
        }
        if self.session.turn_timeout_seconds == 0 {
            return Err(ConfigValidationError::ZeroTimeout(
                "session.turn_timeout_seconds",
            ));
        }

        if let Some(model) = &self.session.model
            && model.trim().is_empty()
        {
            return Err(ConfigValidationError::EmptyModelName);
        }

        if self.client.cli_path.is_some() && self.client.cli_url.is_some() {
            return Err(ConfigValidationError::ConflictingCliSource);
        }
        if let Some(url) = &self.client.cli_url {
            let valid = url
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(ConfigValidationError::InvalidCliUrl(url.clone()));
            }
        }

        if let Some(provider) = &self.provider {
            if provider.provider_type.trim().is_empty() {
                return Err(ConfigValidationError::EmptyProviderField("type"));
            }
            if provider.base_url.trim().is_empty() {
                return Err(ConfigValidationError::EmptyProviderField("base_url"));
            }
        }

        Ok(())
    }

    /// Session settings from `[session]` and `[provider]`; tools and the
    /// permission policy are added by the caller.
    pub fn to_session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new()
            .with_turn_timeout(Duration::from_secs(self.session.turn_timeout_seconds))
            .with_streaming(self.session.streaming);
        if let Some(model) = &self.session.model {
            config = config.with_model(model);
        }
        if let Some(message) = &self.session.system_message {
            config = config.with_system_message(message);
        }
        if let Some(provider) = &self.provider {
            config = config.with_provider(provider.to_provider_config());
        }
        config
    }
}
