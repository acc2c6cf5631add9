//! Permission gate.
//!
//! Every registered tool invocation and every built-in capability request
//! from the backend passes through [`PermissionGate::request`] before it
//! executes. The gate consults the session's single policy, waits for its
//! decision (which may take arbitrarily long), and gives up when the
//! session is torn down.
//!
//! A registered-tool call can be gated from two sides: the backend may send
//! a `custom-tool` permission request before issuing the call, and the
//! dispatcher gates the call when it runs. Both share one decision per call
//! id, so the policy is asked once.

use crate::ports::conversation_logger::{ConversationEvent, ConversationLogger, event_types};
use crate::ports::permission_policy::{PermissionPolicy, PolicyError};
use harness_domain::{
    PermissionDecision, PermissionInvocation, PermissionKind, PermissionRequest, SessionId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The policy failed; this is never turned into a denial.
    #[error("Permission policy failed: {0}")]
    Policy(PolicyError),

    /// The session was closed while the decision was pending.
    #[error("Permission request cancelled")]
    Cancelled,
}

pub struct PermissionGate {
    session_id: SessionId,
    policy: Option<Arc<dyn PermissionPolicy>>,
    cancel: CancellationToken,
    logger: Arc<dyn ConversationLogger>,
    /// Decisions for registered-tool calls, by call id.
    tool_decisions: StdMutex<HashMap<String, Arc<OnceCell<PermissionDecision>>>>,
}

impl PermissionGate {
    pub fn new(
        session_id: SessionId,
        policy: Option<Arc<dyn PermissionPolicy>>,
        cancel: CancellationToken,
        logger: Arc<dyn ConversationLogger>,
    ) -> Self {
        Self {
            session_id,
            policy,
            cancel,
            logger,
            tool_decisions: StdMutex::new(HashMap::new()),
        }
    }

    /// Obtain exactly one decision for `request`.
    ///
    /// Without a policy the request is denied with
    /// [`PermissionDecision::DeniedNoApprovalRule`]. A `custom-tool` request
    /// for a call that was already decided gets the earlier decision.
    pub async fn request(
        &self,
        request: &PermissionRequest,
        tool_call_id: Option<String>,
    ) -> Result<PermissionDecision, GateError> {
        let invocation = PermissionInvocation {
            session_id: self.session_id.clone(),
            tool_call_id,
        };

        let Some(cell) = self.tool_decision(request, invocation.tool_call_id.as_deref()) else {
            return self.decide(request, &invocation).await;
        };
        if let Some(decision) = cell.get() {
            debug!(
                session_id = %self.session_id,
                "Permission {} already decided: {}",
                request.summary(),
                decision
            );
            return Ok(*decision);
        }
        cell.get_or_try_init(|| self.decide(request, &invocation))
            .await
            .copied()
    }

    fn tool_decision(
        &self,
        request: &PermissionRequest,
        tool_call_id: Option<&str>,
    ) -> Option<Arc<OnceCell<PermissionDecision>>> {
        if request.kind != PermissionKind::CustomTool {
            return None;
        }
        let id = tool_call_id?;
        let mut decisions = self
            .tool_decisions
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Some(Arc::clone(decisions.entry(id.to_string()).or_default()))
    }

    async fn decide(
        &self,
        request: &PermissionRequest,
        invocation: &PermissionInvocation,
    ) -> Result<PermissionDecision, GateError> {
        let decision = match &self.policy {
            None => PermissionDecision::DeniedNoApprovalRule,
            Some(policy) => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        debug!(
                            session_id = %self.session_id,
                            "Permission request {} cancelled",
                            request.summary()
                        );
                        return Err(GateError::Cancelled);
                    }
                    result = policy.decide(request, invocation) => {
                        result.map_err(|e| {
                            warn!(
                                session_id = %self.session_id,
                                "Permission policy failed for {}: {}",
                                request.summary(),
                                e
                            );
                            GateError::Policy(e)
                        })?
                    }
                }
            }
        };

        debug!(
            session_id = %self.session_id,
            "Permission {} -> {}",
            request.summary(),
            decision
        );
        self.logger.log(ConversationEvent::new(
            event_types::PERMISSION_DECISION,
            serde_json::json!({
                "session_id": self.session_id.as_str(),
                "tool_call_id": invocation.tool_call_id,
                "kind": request.kind.as_str(),
                "tool": request.tool_name,
                "decision": decision.as_str(),
            }),
        ));

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::conversation_logger::NoConversationLogger;
    use crate::ports::permission_policy::{ApproveAll, from_fn};
    use harness_domain::ToolCall;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingLogger(Mutex<Vec<serde_json::Value>>);

    impl ConversationLogger for RecordingLogger {
        fn log(&self, event: ConversationEvent) {
            self.0.lock().unwrap().push(event.payload);
        }
    }

    fn gate(policy: Option<Arc<dyn PermissionPolicy>>, cancel: CancellationToken) -> PermissionGate {
        PermissionGate::new(
            SessionId::new("s1"),
            policy,
            cancel,
            Arc::new(NoConversationLogger),
        )
    }

    #[tokio::test]
    async fn test_approve_all_is_logged() {
        let logger = Arc::new(RecordingLogger(Mutex::new(Vec::new())));
        let gate = PermissionGate::new(
            SessionId::new("s1"),
            Some(Arc::new(ApproveAll)),
            CancellationToken::new(),
            logger.clone(),
        );
        let decision = gate
            .request(&PermissionRequest::new(PermissionKind::Read), None)
            .await
            .unwrap();
        assert!(decision.is_approved());
        let logged = logger.0.lock().unwrap();
        assert_eq!(logged[0]["decision"], "approved");
        assert_eq!(logged[0]["kind"], "read");
    }

    #[tokio::test]
    async fn test_missing_policy_denies() {
        let gate = gate(None, CancellationToken::new());
        let decision = gate
            .request(&PermissionRequest::new(PermissionKind::Shell), None)
            .await
            .unwrap();
        assert_eq!(decision, PermissionDecision::DeniedNoApprovalRule);
    }

    #[tokio::test]
    async fn test_policy_failure_is_not_a_denial() {
        let policy = from_fn(|_req, _inv| async {
            Err::<PermissionDecision, _>(PolicyError::new("broken"))
        });
        let gate = gate(Some(policy), CancellationToken::new());
        let err = gate
            .request(&PermissionRequest::new(PermissionKind::Shell), None)
            .await
            .unwrap_err();
        assert_eq!(err, GateError::Policy(PolicyError::new("broken")));
    }

    #[tokio::test]
    async fn test_tool_call_is_decided_once() {
        let asked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&asked);
        let policy = from_fn(move |_req, _inv| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(PermissionDecision::DeniedInteractivelyByUser)
            }
        });
        let gate = gate(Some(policy), CancellationToken::new());
        let call = ToolCall::new("tc-1", "encrypt_string").with_arg("input", "Hello");
        let request = PermissionRequest::custom_tool(&call);

        let first = gate.request(&request, Some("tc-1".to_string())).await.unwrap();
        let second = gate.request(&request, Some("tc-1".to_string())).await.unwrap();
        assert_eq!(first, PermissionDecision::DeniedInteractivelyByUser);
        assert_eq!(second, first);
        assert_eq!(asked.load(Ordering::SeqCst), 1);

        let other = ToolCall::new("tc-2", "encrypt_string");
        gate.request(&PermissionRequest::custom_tool(&other), Some("tc-2".to_string()))
            .await
            .unwrap();
        gate.request(&PermissionRequest::new(PermissionKind::Shell), Some("tc-1".to_string()))
            .await
            .unwrap();
        assert_eq!(asked.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_releases_pending_decision() {
        let policy = from_fn(|_req, _inv| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(PermissionDecision::Approved)
        });
        let cancel = CancellationToken::new();
        let gate = gate(Some(policy), cancel.clone());

        let pending = tokio::spawn(async move {
            gate.request(&PermissionRequest::new(PermissionKind::Url), None)
                .await
        });
        cancel.cancel();
        assert_eq!(pending.await.unwrap(), Err(GateError::Cancelled));
    }
}
