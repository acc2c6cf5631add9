//! Copilot client: process lifecycle and session factory.
//!
//! [`CopilotClient`] owns the connection to one Copilot CLI server. It either
//! spawns `copilot --server` (discovering the executable on `PATH` when no
//! path is configured) or connects to an already running server, then hands
//! out [`Session`]s that share the connection.

use crate::copilot::error::{CopilotError, Result};
use crate::copilot::protocol::{ListModelsResult, ModelInfo, PingResult, methods};
use crate::copilot::router::{DEFAULT_REQUEST_TIMEOUT, MessageRouter};
use harness_application::{
    AgentConnection, ConnectionError, ConversationLogger, NoConversationLogger, ResumeSessionConfig, Session,
    SessionConfig, SessionContext, SessionError,
};
use harness_domain::SessionId;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default bound for the CLI to announce its port.
pub const DEFAULT_SPAWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How to reach the Copilot CLI.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Executable to spawn. Looked up on `PATH` when unset.
    pub cli_path: Option<PathBuf>,
    /// Extra arguments passed after `--server`.
    pub cli_args: Vec<String>,
    /// Address (`host:port`) of a running server. Takes precedence over spawning.
    pub cli_url: Option<String>,
    pub spawn_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            cli_path: None,
            cli_args: Vec::new(),
            cli_url: None,
            spawn_timeout: DEFAULT_SPAWN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientOptions {
    pub fn with_cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_path = Some(path.into());
        self
    }

    pub fn with_cli_url(mut self, url: impl Into<String>) -> Self {
        self.cli_url = Some(url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Connection state as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Never started, or the connection dropped on its own.
    Disconnected,
    Connected,
    /// Stopped by [`CopilotClient::stop`] or [`CopilotClient::force_stop`].
    Stopped,
}

pub struct CopilotClient {
    options: ClientOptions,
    router: RwLock<Option<Arc<MessageRouter>>>,
    stopped: StdMutex<bool>,
    /// Parent of every session's cancellation token; renewed on start.
    cancel: StdMutex<CancellationToken>,
    logger: Arc<dyn ConversationLogger>,
    start_lock: tokio::sync::Mutex<()>,
}

impl CopilotClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            router: RwLock::new(None),
            stopped: StdMutex::new(false),
            cancel: StdMutex::new(CancellationToken::new()),
            logger: Arc::new(NoConversationLogger),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Record conversation events of every session created by this client.
    pub fn with_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Establish the connection. A no-op while already connected; after
    /// `stop()` this reconnects.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.start_lock.lock().await;
        if self.state() == ClientState::Connected {
            return Ok(());
        }

        let router = match &self.options.cli_url {
            Some(url) => MessageRouter::connect(url, self.options.request_timeout).await?,
            None => {
                let cli_path = self.resolve_cli_path()?;
                MessageRouter::spawn(
                    &cli_path,
                    &self.options.cli_args,
                    self.options.spawn_timeout,
                    self.options.request_timeout,
                )
                .await?
            }
        };

        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = CancellationToken::new();
        *self.router.write().unwrap_or_else(|e| e.into_inner()) = Some(router);
        *self.stopped.lock().unwrap_or_else(|e| e.into_inner()) = false;
        info!("CopilotClient connected");
        Ok(())
    }

    fn resolve_cli_path(&self) -> Result<PathBuf> {
        match &self.options.cli_path {
            Some(path) => Ok(path.clone()),
            None => which::which("copilot").map_err(|_| {
                CopilotError::CliNotFound(
                    "`copilot` was not found on PATH; set client.cli_path or client.cli_url".into(),
                )
            }),
        }
    }

    /// Orderly shutdown: destroys every live session, closes the connection
    /// and fails outstanding turns with `ChannelClosed`.
    ///
    /// Returns the errors of sessions that could not be destroyed.
    pub async fn stop(&self) -> Vec<CopilotError> {
        let router = self.router.write().unwrap_or_else(|e| e.into_inner()).take();
        let errors = match router {
            Some(router) => router.stop().await,
            None => Vec::new(),
        };
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).cancel();
        *self.stopped.lock().unwrap_or_else(|e| e.into_inner()) = true;
        if !errors.is_empty() {
            warn!("CopilotClient stopped with {} error(s)", errors.len());
        }
        errors
    }

    /// Kill the connection without destroying sessions.
    pub fn force_stop(&self) {
        if let Some(router) = self.router.write().unwrap_or_else(|e| e.into_inner()).take() {
            router.force_stop();
        }
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).cancel();
        *self.stopped.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn state(&self) -> ClientState {
        let router = self.router.read().unwrap_or_else(|e| e.into_inner());
        match router.as_ref() {
            Some(router) if !router.is_closed() => ClientState::Connected,
            _ if *self.stopped.lock().unwrap_or_else(|e| e.into_inner()) => ClientState::Stopped,
            _ => ClientState::Disconnected,
        }
    }

    fn router(&self) -> Result<Arc<MessageRouter>> {
        self.router
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|r| !r.is_closed())
            .cloned()
            .ok_or(CopilotError::NotConnected)
    }

    fn session_context(&self, router: Arc<MessageRouter>) -> SessionContext {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let connection: Arc<dyn AgentConnection> = router;
        SessionContext::new(connection)
            .with_cancel(cancel)
            .with_logger(Arc::clone(&self.logger))
    }

    /// Models the backend offers (`models.list`).
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let result = self
            .router()?
            .request(methods::MODELS_LIST, serde_json::json!({}))
            .await?;
        let list: ListModelsResult = serde_json::from_value(result)?;
        Ok(list.models)
    }

    /// Round-trip check; the backend echoes `message`.
    pub async fn ping(&self, message: &str) -> Result<PingResult> {
        let result = self
            .router()?
            .request(methods::PING, serde_json::json!({ "message": message }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn create_session(
        &self,
        config: SessionConfig,
    ) -> std::result::Result<Session, SessionError> {
        let router = self.router().map_err(|e| SessionError::from(ConnectionError::from(e)))?;
        let ctx = self.session_context(router);
        Session::create(&ctx, config).await
    }

    /// Re-attach to a session hosted by the backend, rebuilding its
    /// transcript from `session.getMessages`.
    pub async fn resume_session(
        &self,
        session_id: impl Into<String>,
        config: ResumeSessionConfig,
    ) -> std::result::Result<Session, SessionError> {
        let router = self.router().map_err(|e| SessionError::from(ConnectionError::from(e)))?;
        let ctx = self.session_context(Arc::clone(&router));
        Session::resume(&ctx, router.as_ref(), SessionId::new(session_id), config).await
    }
}

impl Drop for CopilotClient {
    fn drop(&mut self) {
        self.cancel.get_mut().unwrap_or_else(|e| e.into_inner()).cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_is_disconnected() {
        let client = CopilotClient::new(ClientOptions::default());
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[test]
    fn test_force_stop_marks_stopped() {
        let client = CopilotClient::new(ClientOptions::default());
        client.force_stop();
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[tokio::test]
    async fn test_session_before_start_is_unavailable() {
        let client = CopilotClient::new(ClientOptions::default());
        let err = client.create_session(SessionConfig::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_cli_path_fails_to_start() {
        let client = CopilotClient::new(
            ClientOptions::default().with_cli_path("/nonexistent/copilot-harness-test-cli"),
        );
        assert!(matches!(
            client.start().await,
            Err(CopilotError::SpawnError(_))
        ));
        assert_eq!(client.state(), ClientState::Disconnected);
    }
}
