//! Per-session pump task.
//!
//! The pump is the only consumer of a session's inbound stream. It handles
//! messages strictly in receipt order, with one exception: while a tool
//! batch is outstanding, everything except `tool.call` and permission
//! requests is buffered until every result of the batch has been written.
//!
//! ```text
//! assistant.message(toolRequests) ──▶ batch opens (expected = registered calls)
//! tool.call × N                   ──▶ one dispatch task per call
//! all dispatches finished         ──▶ respond(batch) ─▶ buffered events resume
//! session.idle                    ──▶ oldest turn completes with the last reply
//! ```
//!
//! An announced call may never be issued: the turn was aborted, or the
//! backend denied it itself. A denial removes the call from the batch, and
//! a buffered event that ends the turn (`session.idle`, `abort`,
//! `session.error`) drops whatever is still expected, so the buffer always
//! drains.

use super::state::SessionShared;
use crate::dispatch::ToolDispatcher;
use crate::error::SessionError;
use crate::permission::{GateError, PermissionGate};
use crate::ports::agent_connection::{InboundEvent, OutboundReply, Reply, RequestId};
use crate::ports::conversation_logger::{ConversationEvent, event_types};
use crate::ports::permission_policy::PolicyError;
use harness_domain::{
    Message, PermissionDecision, PermissionKind, PermissionRequest, SessionEvent, ToolCall, ToolFailure,
    ToolResult, TurnPhase, event_kinds,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

type DispatchOutcome = Result<ToolResult, PolicyError>;
/// Request id, the gated registered-tool call id, and the decision.
type PermissionOutcome = (RequestId, Option<String>, Result<PermissionDecision, GateError>);

/// Tool calls of the current round-trip.
#[derive(Default)]
struct ToolBatch {
    open: bool,
    /// Announced calls for registered tools whose `tool.call` has not
    /// arrived yet, by call id.
    expected: HashMap<String, ToolCall>,
    running: JoinSet<DispatchOutcome>,
    tasks: HashMap<TaskId, (RequestId, ToolCall)>,
    replies: Vec<OutboundReply>,
    results: Vec<ToolResult>,
}

impl ToolBatch {
    fn is_settled(&self) -> bool {
        self.open && self.expected.is_empty() && self.running.is_empty()
    }
}

/// Events after which the backend issues no further `tool.call` for the turn.
fn ends_turn(event: &SessionEvent) -> bool {
    matches!(
        event.event_type.as_str(),
        event_kinds::SESSION_IDLE | event_kinds::SESSION_ERROR | event_kinds::ABORT
    )
}

pub(crate) struct SessionPump {
    shared: Arc<SessionShared>,
    inbound: mpsc::UnboundedReceiver<InboundEvent>,
    dispatcher: Arc<ToolDispatcher>,
    gate: Arc<PermissionGate>,
    batch: ToolBatch,
    permissions: JoinSet<PermissionOutcome>,
    buffered: VecDeque<InboundEvent>,
    /// Call ids already handed to the dispatcher.
    dispatched: HashSet<String>,
    /// Last content-bearing terminal assistant message of the running turn.
    reply: Option<Message>,
}

impl SessionPump {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        inbound: mpsc::UnboundedReceiver<InboundEvent>,
        dispatcher: Arc<ToolDispatcher>,
        gate: Arc<PermissionGate>,
    ) -> Self {
        Self {
            shared,
            inbound,
            dispatcher,
            gate,
            batch: ToolBatch::default(),
            permissions: JoinSet::new(),
            buffered: VecDeque::new(),
            dispatched: HashSet::new(),
            reply: None,
        }
    }

    pub(crate) async fn run(mut self) {
        let reason = self.pump().await;
        self.shutdown(reason).await;
    }

    async fn pump(&mut self) -> SessionError {
        loop {
            if !self.batch.open
                && let Some(next) = self.buffered.pop_front()
            {
                if let Err(e) = self.handle(next).await {
                    return e;
                }
                continue;
            }

            let step = tokio::select! {
                biased;
                _ = self.shared.cancel.cancelled() => return SessionError::ChannelClosed,
                Some(joined) = self.batch.running.join_next_with_id(), if !self.batch.running.is_empty() => {
                    self.on_dispatch_finished(joined).await
                }
                Some(joined) = self.permissions.join_next(), if !self.permissions.is_empty() => {
                    self.on_permission_decided(joined).await
                }
                inbound = self.inbound.recv() => match inbound {
                    Some(message) => self.handle(message).await,
                    None => {
                        debug!(session_id = %self.shared.id, "Inbound stream closed");
                        return SessionError::ChannelClosed;
                    }
                },
            };
            if let Err(e) = step {
                return e;
            }
        }
    }

    async fn handle(&mut self, message: InboundEvent) -> Result<(), SessionError> {
        match message {
            InboundEvent::ToolCall { request_id, call } => self.on_tool_call(request_id, call).await,
            InboundEvent::Permission {
                request_id,
                request,
            } => {
                self.on_permission_request(request_id, request);
                Ok(())
            }
            InboundEvent::Event(event) if self.batch.open => {
                trace!(
                    session_id = %self.shared.id,
                    "Buffering {} until tool results are sent",
                    event.event_type
                );
                let closes_turn = ends_turn(&event);
                self.buffered.push_back(InboundEvent::Event(event));
                if closes_turn {
                    self.abandon_expected().await?;
                }
                Ok(())
            }
            InboundEvent::Event(event) => {
                let _ = self.shared.events.send(event.clone());
                self.on_event(&event);
                Ok(())
            }
        }
    }

    // ==================== Session events ====================

    fn on_event(&mut self, event: &SessionEvent) {
        match event.event_type.as_str() {
            event_kinds::ASSISTANT_MESSAGE => self.on_assistant_message(event),
            event_kinds::SESSION_IDLE => self.on_idle(),
            event_kinds::SESSION_ERROR => self.on_session_error(event),
            other => trace!(session_id = %self.shared.id, "Event: {}", other),
        }
    }

    fn on_assistant_message(&mut self, event: &SessionEvent) {
        let calls = event.tool_requests();
        let message =
            Message::assistant_with_tools(event.content().map(str::to_string), calls.clone());

        let mut state = self.shared.state();
        if let Err(e) = state.transcript.push_assistant(message.clone()) {
            warn!(session_id = %self.shared.id, "Dropping assistant message: {}", e);
            return;
        }
        state.phase = match state.phase.on_assistant_message(calls.len()) {
            Ok(phase) => phase,
            Err(e) => {
                warn!(session_id = %self.shared.id, "{}", e);
                return;
            }
        };

        if message.is_terminal() {
            if message.text().is_some() {
                self.reply = Some(message);
            }
            return;
        }

        self.batch.expected = calls
            .into_iter()
            .filter(|c| self.dispatcher.is_registered(&c.tool_name) && !self.dispatched.contains(&c.id))
            .map(|c| (c.id.clone(), c))
            .collect();

        if self.batch.expected.is_empty() {
            // Only built-in capabilities were requested; the backend runs them.
            state.phase = state.phase.on_tool_results_sent().unwrap_or(state.phase);
        } else {
            debug!(
                session_id = %self.shared.id,
                "Tool batch opened: {} call(s) expected",
                self.batch.expected.len()
            );
            self.batch.open = true;
        }
    }

    fn on_idle(&mut self) {
        let reply = self.reply.take();
        let mut state = self.shared.state();
        match state.phase.on_idle() {
            Ok(phase) => state.phase = phase,
            Err(e) => warn!(session_id = %self.shared.id, "{}", e),
        }

        let Some(seq) = state.turns.pop_front() else {
            debug!(session_id = %self.shared.id, "Idle without an outstanding turn");
            return;
        };
        if let Some(tx) = state.waiters.remove(&seq) {
            let _ = tx.send(Ok(reply.clone()));
        }
        drop(state);

        self.shared.logger.log(ConversationEvent::new(
            event_types::TURN_COMPLETE,
            serde_json::json!({
                "session_id": self.shared.id.as_str(),
                "turn": seq,
                "reply_bytes": reply.as_ref().and_then(|m| m.text()).map(str::len),
            }),
        ));
    }

    fn on_session_error(&mut self, event: &SessionEvent) {
        let message = event
            .error_message()
            .unwrap_or("Unknown session error")
            .to_string();
        warn!(session_id = %self.shared.id, "Session error: {}", message);

        // The turn stays queued; its closing idle is still expected.
        let mut state = self.shared.state();
        if let Some(seq) = state.turns.front().copied()
            && let Some(tx) = state.waiters.remove(&seq)
        {
            let _ = tx.send(Err(SessionError::Rpc { code: -1, message }));
        }
    }

    // ==================== Tool calls ====================

    /// Stop waiting for announced calls the backend will not issue.
    async fn abandon_expected(&mut self) -> Result<(), SessionError> {
        if self.batch.expected.is_empty() {
            return Ok(());
        }
        let mut ids: Vec<String> = self.batch.expected.drain().map(|(id, _)| id).collect();
        ids.sort();
        debug!(
            session_id = %self.shared.id,
            "Turn ended before tool call(s) {} were issued",
            ids.join(", ")
        );
        if self.batch.is_settled() {
            self.flush_batch().await?;
        }
        Ok(())
    }

    /// The backend denied an announced call; no `tool.call` follows for it.
    async fn on_call_denied(&mut self, call_id: &str) -> Result<(), SessionError> {
        if self.batch.expected.remove(call_id).is_none() {
            return Ok(());
        }
        debug!(session_id = %self.shared.id, "Tool call {} denied before it was issued", call_id);
        if self.batch.is_settled() {
            self.flush_batch().await?;
        }
        Ok(())
    }

    async fn on_tool_call(&mut self, request_id: RequestId, call: ToolCall) -> Result<(), SessionError> {
        if !self.dispatched.insert(call.id.clone()) {
            warn!(
                session_id = %self.shared.id,
                "Duplicate tool call id {}, not invoking '{}'",
                call.id, call.tool_name
            );
            let reply = OutboundReply::new(
                request_id,
                Reply::Failure(format!("duplicate tool call id {}", call.id)),
            );
            if self.batch.open {
                self.batch.replies.push(reply);
                return Ok(());
            }
            return self.shared.connection.respond(vec![reply]).await.map_err(Into::into);
        }

        if self.batch.expected.remove(&call.id).is_none() {
            self.adopt_unexpected_call(&call);
        }
        self.batch.open = true;

        debug!(
            session_id = %self.shared.id,
            "Dispatching tool call {} ({})",
            call.id, call.tool_name
        );
        let dispatcher = Arc::clone(&self.dispatcher);
        let task_call = call.clone();
        let handle = self
            .batch
            .running
            .spawn(async move { dispatcher.dispatch(&task_call).await });
        self.batch.tasks.insert(handle.id(), (request_id, call));
        Ok(())
    }

    /// A `tool.call` that no open batch expected.
    ///
    /// If no assistant message announced it, a synthetic one is recorded so
    /// the transcript never holds a result before its call.
    fn adopt_unexpected_call(&mut self, call: &ToolCall) {
        let mut state = self.shared.state();
        if !state.transcript.is_issued(&call.id) {
            debug!(
                session_id = %self.shared.id,
                "Tool call {} was not announced; recording it",
                call.id
            );
            if let Err(e) = state
                .transcript
                .push_assistant(Message::assistant_with_tools(None, vec![call.clone()]))
            {
                warn!(session_id = %self.shared.id, "{}", e);
            }
        }
        if state.phase != TurnPhase::DispatchingTools {
            state.phase = state
                .phase
                .on_assistant_message(1)
                .unwrap_or(TurnPhase::DispatchingTools);
        }
    }

    async fn on_dispatch_finished(
        &mut self,
        joined: Result<(TaskId, DispatchOutcome), JoinError>,
    ) -> Result<(), SessionError> {
        let (task_id, outcome) = match joined {
            Ok((task_id, outcome)) => (task_id, Some(outcome)),
            Err(e) => {
                error!(session_id = %self.shared.id, panicked = e.is_panic(), "Dispatch task failed");
                (e.id(), None)
            }
        };
        let Some((request_id, call)) = self.batch.tasks.remove(&task_id) else {
            return Ok(());
        };

        let result = match outcome {
            Some(Ok(result)) => result,
            Some(Err(policy_error)) => {
                self.batch.replies.push(OutboundReply::new(
                    request_id,
                    Reply::Failure("permission policy failed".to_string()),
                ));
                return Err(self.policy_failed(policy_error).await);
            }
            None => ToolResult::failure(&call.id, &call.tool_name, ToolFailure::execution_failed()),
        };

        self.batch.results.push(result.clone());
        self.batch
            .replies
            .push(OutboundReply::new(request_id, Reply::ToolResult(result)));

        if self.batch.is_settled() {
            self.flush_batch().await?;
        }
        Ok(())
    }

    /// Write every reply of the batch in one go, then record the results.
    async fn flush_batch(&mut self) -> Result<(), SessionError> {
        let replies = std::mem::take(&mut self.batch.replies);
        let results = std::mem::take(&mut self.batch.results);
        self.batch.open = false;

        if !replies.is_empty() {
            debug!(
                session_id = %self.shared.id,
                "Sending {} tool result(s)",
                replies.len()
            );
            self.shared.connection.respond(replies).await?;
        }

        let mut state = self.shared.state();
        for result in &results {
            if let Err(e) = state.transcript.push_tool_result(result) {
                warn!(session_id = %self.shared.id, "{}", e);
            }
        }
        match state.phase.on_tool_results_sent() {
            Ok(phase) => state.phase = phase,
            Err(e) => warn!(session_id = %self.shared.id, "{}", e),
        }
        Ok(())
    }

    // ==================== Permission requests ====================

    fn on_permission_request(&mut self, request_id: RequestId, request: PermissionRequest) {
        debug!(
            session_id = %self.shared.id,
            "Permission requested: {}",
            request.summary()
        );
        let gate = Arc::clone(&self.gate);
        let gated_call = request
            .tool_call_id
            .clone()
            .filter(|_| request.kind == PermissionKind::CustomTool);
        self.permissions.spawn(async move {
            let decision = gate.request(&request, request.tool_call_id.clone()).await;
            (request_id, gated_call, decision)
        });
    }

    async fn on_permission_decided(
        &mut self,
        joined: Result<PermissionOutcome, JoinError>,
    ) -> Result<(), SessionError> {
        let (request_id, gated_call, decision) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(session_id = %self.shared.id, panicked = e.is_panic(), "Permission task failed");
                return Err(SessionError::PermissionPolicy(
                    "permission policy did not complete".to_string(),
                ));
            }
        };

        let reply = match decision {
            Ok(decision) => {
                if !decision.is_approved()
                    && let Some(call_id) = &gated_call
                {
                    self.on_call_denied(call_id).await?;
                }
                Reply::Permission(decision)
            }
            Err(GateError::Cancelled) => Reply::Permission(PermissionDecision::DeniedNoApprovalRule),
            Err(GateError::Policy(e)) => {
                self.shared
                    .connection
                    .respond(vec![OutboundReply::new(
                        request_id,
                        Reply::Failure("permission policy failed".to_string()),
                    )])
                    .await
                    .ok();
                return Err(self.policy_failed(e).await);
            }
        };
        self.shared
            .connection
            .respond(vec![OutboundReply::new(request_id, reply)])
            .await
            .map_err(Into::into)
    }

    /// Send whatever the open batch holds and report the policy failure.
    async fn policy_failed(&mut self, e: PolicyError) -> SessionError {
        error!(session_id = %self.shared.id, "Permission policy failed: {}", e);
        let replies = std::mem::take(&mut self.batch.replies);
        if !replies.is_empty()
            && let Err(send_err) = self.shared.connection.respond(replies).await
        {
            warn!(session_id = %self.shared.id, "Failed to send replies: {}", send_err);
        }
        SessionError::PermissionPolicy(e.message().to_string())
    }

    // ==================== Shutdown ====================

    async fn shutdown(mut self, reason: SessionError) {
        let first = self.shared.finish(reason.clone());
        self.shared.cancel.cancel();

        // Dispatches and permission waits observe the token and finish quickly.
        while self.batch.running.join_next().await.is_some() {}
        while self.permissions.join_next().await.is_some() {}

        self.inbound.close();
        self.shared.connection.release_session(&self.shared.id);
        if first {
            info!(session_id = %self.shared.id, "Session stopped: {}", reason);
        } else {
            debug!(session_id = %self.shared.id, "Session pump stopped");
        }
    }
}
