//! CLI entrypoint for copilot-harness
//!
//! This is the main binary that wires together all layers: configuration,
//! the Copilot client, one session with the local tools, and the chat loop.

mod chat;
mod cli;
mod tools;

use anyhow::{Context, Result, anyhow};
use chat::ChatLoop;
use clap::Parser;
use cli::{Cli, PermissionMode};
use harness_application::{
    ApproveAll, ConversationLogger, DenyAll, PermissionPolicy, ResumeSessionConfig, Session,
    SessionConfig,
};
use harness_infrastructure::{
    ConfigLoader, CopilotClient, FileConfig, JsonlConversationLogger, ModelInfo,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources();
        return Ok(());
    }

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref())
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?
    };
    config.validate().context("Invalid configuration")?;

    let _log_guard = init_logging(cli.verbose, config.logging.file.as_deref())?;
    info!("Starting copilot-harness");

    // === Dependency Injection ===
    let mut client = CopilotClient::new(config.client.to_client_options());
    if let Some(logger) = conversation_logger(&config) {
        client = client.with_logger(logger);
    }

    if let Err(e) = client.start().await {
        client.force_stop();
        return Err(e).context("Failed to start the Copilot CLI");
    }

    let result = run(&cli, &config, &client).await;
    match &result {
        Ok(()) => {
            for e in client.stop().await {
                warn!("Shutdown: {}", e);
            }
        }
        Err(_) => client.force_stop(),
    }
    result
}

async fn run(cli: &Cli, config: &FileConfig, client: &CopilotClient) -> Result<()> {
    if cli.list_models {
        for model in client.list_models().await? {
            println!("{:<28} {}", model.id, model.name);
        }
        return Ok(());
    }

    let timeout = Duration::from_secs(cli.timeout);
    let session = open_session(cli, config, client).await?;
    ChatLoop::new(session, timeout).run().await?;
    Ok(())
}

async fn open_session(cli: &Cli, config: &FileConfig, client: &CopilotClient) -> Result<Session> {
    let policy: Arc<dyn PermissionPolicy> = match cli.permission {
        PermissionMode::Approve => Arc::new(ApproveAll),
        PermissionMode::Deny => Arc::new(DenyAll),
    };

    let mut session_config = config
        .to_session_config()
        .with_permission_policy(policy)
        .with_turn_timeout(Duration::from_secs(cli.timeout));
    for tool in tools::all() {
        session_config = session_config.with_tool(tool);
    }

    if let Some(session_id) = &cli.resume {
        let session = client
            .resume_session(session_id.clone(), ResumeSessionConfig::from(session_config))
            .await
            .with_context(|| format!("Failed to resume session {}", session_id))?;
        return Ok(session);
    }

    let requested = cli.model.as_deref().or(config.session.model.as_deref());
    session_config.model = choose_model(requested, config.provider.is_some(), client).await;
    Ok(client.create_session(session_config).await?)
}

/// Keep the requested model when the backend offers it, otherwise fall back
/// to the first offered one. Provider models are not listed by the backend,
/// so they are taken as given.
async fn choose_model(
    requested: Option<&str>,
    has_provider: bool,
    client: &CopilotClient,
) -> Option<String> {
    if has_provider {
        return requested.map(str::to_string);
    }
    match client.list_models().await {
        Ok(available) => pick_model(requested, &available),
        Err(e) => {
            warn!("Could not list models: {}", e);
            requested.map(str::to_string)
        }
    }
}

fn pick_model(requested: Option<&str>, available: &[ModelInfo]) -> Option<String> {
    let requested = requested?;
    if available.is_empty() || available.iter().any(|m| m.id == requested) {
        return Some(requested.to_string());
    }
    let fallback = available.first().map(|m| m.id.clone());
    if let Some(model) = &fallback {
        warn!(
            "Model '{}' is not offered by the backend, using '{}'",
            requested, model
        );
    }
    fallback
}

fn init_logging(verbose: u8, file: Option<&str>) -> Result<Option<WorkerGuard>> {
    // Initialize logging based on verbosity level
    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    let Some(file) = file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let path = expand_home(file);
    let name = path
        .file_name()
        .context("logging.file must name a file")?
        .to_owned();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Could not create log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}

fn conversation_logger(config: &FileConfig) -> Option<Arc<dyn ConversationLogger>> {
    let path = expand_home(config.logging.conversation_log.as_deref()?);
    match JsonlConversationLogger::open(&path) {
        Ok(logger) => {
            info!("Conversation log: {}", path.display());
            Some(Arc::new(logger))
        }
        Err(e) => {
            warn!("Conversation log disabled ({}): {}", path.display(), e);
            None
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
