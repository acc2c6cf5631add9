//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How permission requests are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PermissionMode {
    /// Approve every request
    Approve,
    /// Deny every request
    Deny,
}

/// CLI arguments for copilot-harness
#[derive(Parser, Debug)]
#[command(name = "copilot-harness")]
#[command(author, version, about = "Chat with a Copilot CLI session")]
#[command(long_about = r#"
copilot-harness starts (or connects to) a Copilot CLI server, opens a
session with a few local tools registered and chats with it line by line.

Configuration files are loaded from (in priority order):
1. HARNESS_* environment variables   e.g. HARNESS_SESSION__MODEL=gpt-5
2. --config <path>                    Explicit config file
3. ./copilot-harness.toml             Project-level config
4. ~/.config/copilot-harness/config.toml   Global config

Example:
  copilot-harness -m claude-sonnet-4.5
  copilot-harness --list-models
  copilot-harness --resume 5c1e0d2a-... -t 600
"#)]
pub struct Cli {
    /// Model to use for the session
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// List the models the backend offers and exit
    #[arg(short, long)]
    pub list_models: bool,

    /// Seconds to wait for each reply
    #[arg(short, long, value_name = "SECONDS", default_value_t = 300)]
    pub timeout: u64,

    /// Resume an existing session instead of creating one
    #[arg(long, value_name = "SESSION_ID")]
    pub resume: Option<String>,

    /// How to answer permission requests
    #[arg(long, value_enum, default_value = "approve")]
    pub permission: PermissionMode,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}
