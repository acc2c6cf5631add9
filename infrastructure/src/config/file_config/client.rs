//! Client configuration from TOML (`[client]` section)

use crate::copilot::ClientOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How to reach the Copilot CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileClientConfig {
    /// Executable to spawn (default: `copilot` found on `PATH`)
    pub cli_path: Option<String>,
    /// Extra arguments appended after `--server`
    pub cli_args: Vec<String>,
    /// Address of an already running server, e.g. `127.0.0.1:4321`
    pub cli_url: Option<String>,
    /// Seconds to wait for the spawned CLI to announce its port
    pub spawn_timeout_seconds: u64,
    /// Seconds to wait for a single request's response
    pub request_timeout_seconds: u64,
}

impl Default for FileClientConfig {
    fn default() -> Self {
        Self {
            cli_path: None,
            cli_args: Vec::new(),
            cli_url: None,
            spawn_timeout_seconds: 30,
            request_timeout_seconds: 30,
        }
    }
}

impl FileClientConfig {
    pub fn to_client_options(&self) -> ClientOptions {
        let mut options = ClientOptions {
            cli_args: self.cli_args.clone(),
            spawn_timeout: Duration::from_secs(self.spawn_timeout_seconds),
            ..ClientOptions::default()
        }
        .with_request_timeout(Duration::from_secs(self.request_timeout_seconds));
        if let Some(path) = &self.cli_path {
            options = options.with_cli_path(path);
        }
        if let Some(url) = &self.cli_url {
            options = options.with_cli_url(url);
        }
        options
    }
}
