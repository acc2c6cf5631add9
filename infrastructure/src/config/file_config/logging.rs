//! Logging configuration from TOML (`[logging]` section)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// JSONL conversation log path (disabled when unset)
    pub conversation_log: Option<String>,
    /// Diagnostic log file; stderr when unset
    pub file: Option<String>,
}
