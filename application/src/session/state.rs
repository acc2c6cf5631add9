//! State shared between a [`Session`](super::Session) handle and its pump.

use crate::error::SessionError;
use crate::ports::agent_connection::AgentConnection;
use crate::ports::conversation_logger::ConversationLogger;
use harness_domain::{Message, SessionEvent, SessionId, Transcript, TurnPhase};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

pub(crate) type TurnOutcome = Result<Option<Message>, SessionError>;

pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    pub(crate) connection: Arc<dyn AgentConnection>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) cancel: CancellationToken,
    pub(crate) turn_timeout: Duration,
    pub(crate) logger: Arc<dyn ConversationLogger>,
    state: Mutex<SessionState>,
}

/// Mutable session state. Never held across an `.await`.
pub(crate) struct SessionState {
    pub(crate) transcript: Transcript,
    pub(crate) phase: TurnPhase,
    next_turn: u64,
    /// Sequence numbers of transmitted prompts whose `session.idle` has not
    /// arrived yet, oldest first.
    pub(crate) turns: VecDeque<u64>,
    /// Callers of `send_and_wait`, keyed by turn sequence number.
    pub(crate) waiters: HashMap<u64, oneshot::Sender<TurnOutcome>>,
    /// Why the session stopped, once it has.
    pub(crate) ended: Option<SessionError>,
}

impl SessionShared {
    pub(crate) fn new(
        id: SessionId,
        connection: Arc<dyn AgentConnection>,
        transcript: Transcript,
        cancel: CancellationToken,
        turn_timeout: Duration,
        logger: Arc<dyn ConversationLogger>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            id,
            connection,
            events,
            cancel,
            turn_timeout,
            logger,
            state: Mutex::new(SessionState {
                transcript,
                phase: TurnPhase::Idle,
                next_turn: 0,
                turns: VecDeque::new(),
                waiters: HashMap::new(),
                ended: None,
            }),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new turn and record the user prompt.
    ///
    /// Fails if the session already ended.
    pub(crate) fn begin_turn(
        &self,
        prompt: &str,
        waiter: Option<oneshot::Sender<TurnOutcome>>,
    ) -> Result<u64, SessionError> {
        let mut state = self.state();
        if let Some(reason) = &state.ended {
            return Err(reason.for_later_calls());
        }
        let seq = state.next_turn;
        state.next_turn += 1;
        state.turns.push_back(seq);
        if let Some(tx) = waiter {
            state.waiters.insert(seq, tx);
        }
        state.transcript.push_user(prompt);
        state.phase = state.phase.begin();
        Ok(seq)
    }

    /// Forget a turn whose prompt never reached the backend.
    pub(crate) fn abandon_turn(&self, seq: u64) {
        let mut state = self.state();
        state.turns.retain(|s| *s != seq);
        state.waiters.remove(&seq);
    }

    /// Stop waiting for a timed-out turn.
    ///
    /// The sequence number stays queued so the turn's late `session.idle`
    /// is consumed by it instead of completing a later turn.
    pub(crate) fn detach_waiter(&self, seq: u64) {
        self.state().waiters.remove(&seq);
    }

    /// Mark the session ended and fail every waiting caller with `reason`.
    ///
    /// Only the first reason is kept. Returns whether this call ended it.
    pub(crate) fn finish(&self, reason: SessionError) -> bool {
        let mut state = self.state();
        let first = state.ended.is_none();
        if first {
            state.ended = Some(reason.clone());
        }
        for (_, tx) in state.waiters.drain() {
            let _ = tx.send(Err(reason.clone()));
        }
        state.turns.clear();
        first
    }

    pub(crate) fn end_reason(&self) -> SessionError {
        self.state()
            .ended
            .clone()
            .unwrap_or(SessionError::ChannelClosed)
    }
}
