//! Configuration file loading for copilot-harness
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `HARNESS_*` environment variables (`HARNESS_SESSION__MODEL=gpt-5`)
//! 2. `--config <path>` specified file
//! 3. Project root: `./copilot-harness.toml` or `./.copilot-harness.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/copilot-harness/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileClientConfig, FileConfig, FileLoggingConfig, FileProviderConfig,
    FileSessionConfig,
};
pub use loader::ConfigLoader;
