//! Bring-your-own-key provider from TOML (`[provider]` section)

use harness_application::ProviderConfig;
use serde::{Deserialize, Serialize};

/// Model provider passed through to the backend on session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileProviderConfig {
    /// Provider kind, e.g. `openai`, `azure`, `anthropic`
    #[serde(rename = "type")]
    pub provider_type: String,
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Direct API key (prefer `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub wire_api: Option<String>,
}

impl FileProviderConfig {
    /// Resolve the provider, reading the key from `api_key_env` when set.
    pub fn to_provider_config(&self) -> ProviderConfig {
        self.to_provider_config_with(|name| std::env::var(name).ok())
    }

    fn to_provider_config_with(&self, lookup: impl Fn(&str) -> Option<String>) -> ProviderConfig {
        let mut provider = ProviderConfig::new(&self.provider_type, &self.base_url);
        let api_key = self
            .api_key_env
            .as_deref()
            .and_then(&lookup)
            .or_else(|| self.api_key.clone());
        if let Some(key) = api_key {
            provider = provider.with_api_key(key);
        }
        if let Some(wire_api) = &self.wire_api {
            provider = provider.with_wire_api(wire_api);
        }
        provider
    }
}
