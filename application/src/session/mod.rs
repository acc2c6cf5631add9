//! Session engine.
//!
//! A [`Session`] is the caller-facing handle of one conversation hosted by
//! the backend. Each session owns a pump task that consumes its inbound
//! stream, dispatches tool calls, answers permission requests and
//! completes turns. Sessions of the same connection are independent: a
//! slow handler or a pending permission decision in one never delays
//! another.

mod pump;
pub(crate) mod state;


use crate::config::{MessageOptions, ResumeSessionConfig, SessionConfig};
use crate::dispatch::ToolDispatcher;
use crate::error::{ConnectionError, SessionError};
use crate::permission::PermissionGate;
use crate::ports::agent_connection::{AgentConnection, SessionLink, SessionSpec};
use crate::ports::conversation_logger::{ConversationLogger, NoConversationLogger};
use crate::ports::permission_policy::PermissionPolicy;
use crate::ports::session_history::SessionHistoryStore;
use crate::ports::tool_handler::ToolRegistration;
use harness_domain::{Message, SessionEvent, SessionId, Transcript, TurnPhase};
use pump::SessionPump;
use state::{SessionShared, TurnOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of each session's event broadcast. Slow subscribers lag
/// instead of blocking the pump.
const EVENT_CAPACITY: usize = 256;

/// Everything a session needs from the client that owns it.
#[derive(Clone)]
pub struct SessionContext {
    pub connection: Arc<dyn AgentConnection>,
    /// Cancelled when the client stops; every session token is a child.
    pub cancel: CancellationToken,
    pub logger: Arc<dyn ConversationLogger>,
}

impl SessionContext {
    pub fn new(connection: Arc<dyn AgentConnection>) -> Self {
        Self {
            connection,
            cancel: CancellationToken::new(),
            logger: Arc::new(NoConversationLogger),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.logger = logger;
        self
    }
}

/// Handle to one live session.
///
/// Dropping the handle stops the pump and releases the local route; use
/// [`Session::close`] to also release the session on the backend.
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    /// Create a new session on the backend.
    pub async fn create(ctx: &SessionContext, config: SessionConfig) -> Result<Self, SessionError> {
        let spec = SessionSpec::from(&config);
        let link = ctx.connection.create_session(&spec).await?;
        info!(session_id = %link.session_id, "Session created");

        Ok(Self::start(
            ctx,
            link,
            Transcript::new(),
            config.tools,
            config.permission_policy,
            config.turn_timeout,
        ))
    }

    /// Re-attach to a session the backend already hosts.
    ///
    /// The transcript is rebuilt from the backend's history before the
    /// handle is returned, so earlier turns are visible through
    /// [`Session::messages`].
    pub async fn resume(
        ctx: &SessionContext,
        history: &dyn SessionHistoryStore,
        session_id: SessionId,
        config: ResumeSessionConfig,
    ) -> Result<Self, SessionError> {
        let spec = SessionSpec::from(&config);
        let link = ctx
            .connection
            .resume_session(&session_id, &spec)
            .await?;

        let messages = match history.fetch_history(&link.session_id).await {
            Ok(messages) => messages,
            Err(e) => {
                let session_id = link.session_id.clone();
                drop(link);
                ctx.connection.release_session(&session_id);
                return Err(e.into());
            }
        };

        let (transcript, skipped) = Transcript::from_history(messages);
        for e in &skipped {
            warn!(session_id = %link.session_id, "Skipping history entry: {}", e);
        }
        info!(
            session_id = %link.session_id,
            "Session resumed with {} message(s)",
            transcript.len()
        );

        Ok(Self::start(
            ctx,
            link,
            transcript,
            config.tools,
            config.permission_policy,
            config.turn_timeout,
        ))
    }

    fn start(
        ctx: &SessionContext,
        link: SessionLink,
        transcript: Transcript,
        tools: Vec<ToolRegistration>,
        policy: Option<Arc<dyn PermissionPolicy>>,
        turn_timeout: Duration,
    ) -> Self {
        let SessionLink {
            session_id,
            inbound,
        } = link;
        let cancel = ctx.cancel.child_token();

        let gate = Arc::new(PermissionGate::new(
            session_id.clone(),
            policy,
            cancel.clone(),
            Arc::clone(&ctx.logger),
        ));
        let dispatcher = Arc::new(ToolDispatcher::new(
            session_id.clone(),
            tools,
            Arc::clone(&gate),
            cancel.clone(),
            Arc::clone(&ctx.logger),
        ));
        let shared = Arc::new(SessionShared::new(
            session_id,
            Arc::clone(&ctx.connection),
            transcript,
            cancel,
            turn_timeout,
            Arc::clone(&ctx.logger),
            EVENT_CAPACITY,
        ));

        let pump = SessionPump::new(Arc::clone(&shared), inbound, dispatcher, gate);
        tokio::spawn(pump.run());

        Self { shared }
    }

    pub fn id(&self) -> &SessionId {
        &self.shared.id
    }

    /// Transmit a prompt without waiting for the turn to finish.
    pub async fn send(&self, options: impl Into<MessageOptions>) -> Result<(), SessionError> {
        let options = options.into();
        let seq = self.shared.begin_turn(&options.prompt, None)?;
        self.transmit(seq, &options).await
    }

    /// Transmit a prompt and wait until the backend reports the turn idle.
    ///
    /// Returns the last assistant message with content, or `None` when the
    /// turn produced none. On [`SessionError::TurnTimedOut`] the turn keeps
    /// running on the backend and the session stays usable.
    pub async fn send_and_wait(
        &self,
        options: impl Into<MessageOptions>,
        timeout: Option<Duration>,
    ) -> Result<Option<Message>, SessionError> {
        let options = options.into();
        let limit = timeout.unwrap_or(self.shared.turn_timeout);

        let (tx, rx) = oneshot::channel::<TurnOutcome>();
        let seq = self.shared.begin_turn(&options.prompt, Some(tx))?;
        self.transmit(seq, &options).await?;

        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(self.shared.end_reason()),
            Err(_) => {
                self.shared.detach_waiter(seq);
                debug!(session_id = %self.shared.id, "Turn {} timed out after {:?}", seq, limit);
                Err(SessionError::TurnTimedOut(limit))
            }
        }
    }

    async fn transmit(&self, seq: u64, options: &MessageOptions) -> Result<(), SessionError> {
        if let Err(e) = self
            .shared
            .connection
            .send_prompt(&self.shared.id, options)
            .await
        {
            self.shared.abandon_turn(seq);
            return Err(e.into());
        }
        Ok(())
    }

    /// Subscribe to every event of this session, in receipt order.
    ///
    /// Events are buffered while a tool batch is outstanding, so a
    /// subscriber never sees a later assistant message before the results
    /// it depends on were sent.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Snapshot of the transcript.
    pub fn messages(&self) -> Vec<Message> {
        self.shared.state().transcript.messages().to_vec()
    }

    pub fn phase(&self) -> TurnPhase {
        self.shared.state().phase
    }

    /// Ask the backend to abort the running turn.
    pub async fn abort(&self) -> Result<(), SessionError> {
        if let Some(reason) = &self.shared.state().ended {
            return Err(reason.for_later_calls());
        }
        self.shared
            .connection
            .abort(&self.shared.id)
            .await
            .map_err(Into::into)
    }

    /// Stop the session and release it on the backend.
    ///
    /// Pending waits fail with [`SessionError::Cancelled`]. Closing an
    /// already closed session is a no-op; closing a failed session still
    /// releases it on the backend.
    pub async fn close(&self) -> Result<(), SessionError> {
        if self.shared.state().ended == Some(SessionError::Cancelled) {
            return Ok(());
        }
        self.shared.finish(SessionError::Cancelled);
        self.shared.cancel.cancel();
        self.shared.connection.release_session(&self.shared.id);

        match self.shared.connection.destroy_session(&self.shared.id).await {
            Ok(()) | Err(ConnectionError::Closed) => {
                info!(session_id = %self.shared.id, "Session closed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        self.shared.connection.release_session(&self.shared.id);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .finish_non_exhaustive()
    }
}
