//! Session defaults from TOML (`[session]` section)

use harness_application::DEFAULT_TURN_TIMEOUT;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSessionConfig {
    /// Model requested at session creation (backend default when unset)
    pub model: Option<String>,
    /// Seconds a `send_and_wait` may take before failing
    pub turn_timeout_seconds: u64,
    /// Ask the backend for delta events
    pub streaming: bool,
    /// Appended to the backend's system prompt
    pub system_message: Option<String>,
}

impl Default for FileSessionConfig {
    fn default() -> Self {
        Self {
            model: None,
            turn_timeout_seconds: DEFAULT_TURN_TIMEOUT.as_secs(),
            streaming: false,
            system_message: None,
        }
    }
}
