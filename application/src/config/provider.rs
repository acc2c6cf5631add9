//! Custom model provider configuration.

use serde::{Deserialize, Serialize};

/// An OpenAI-compatible (or other) endpoint the backend should use instead
/// of its default authenticated models.
///
/// Passed through to the backend unchanged on session creation or resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider flavour, e.g. `"openai"` or `"azure"`.
    #[serde(rename = "type")]
    pub provider_type: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Wire API variant, e.g. `"completions"` or `"responses"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire_api: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider_type: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            base_url: base_url.into(),
            api_key: None,
            wire_api: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_wire_api(mut self, wire_api: impl Into<String>) -> Self {
        self.wire_api = Some(wire_api.into());
        self
    }
}
