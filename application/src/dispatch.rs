//! Tool invocation dispatcher.
//!
//! Turns one backend-issued [`ToolCall`] into exactly one [`ToolResult`]:
//!
//! ```text
//! lookup ──unknown──▶ UnknownTool
//!   │
//! permission ──denied──▶ PermissionDenied(decision)
//!   │
//! validate ──mismatch──▶ BadToolArguments
//!   │
//! handler (own task) ──Err / panic──▶ ExecutionFailed ("tool execution failed")
//!   │
//! serialize ──▶ Success
//! ```
//!
//! Handler error detail is logged through `tracing` and dropped; the
//! model-visible result only ever carries the generic failure text.

use crate::permission::{GateError, PermissionGate};
use crate::ports::conversation_logger::{ConversationEvent, ConversationLogger, event_types};
use crate::ports::permission_policy::PolicyError;
use crate::ports::tool_handler::{ToolInvocation, ToolRegistration};
use harness_domain::{
    DefaultToolValidator, PermissionRequest, SessionId, ToolCall, ToolContent, ToolFailure,
    ToolResult, ToolValidator,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum bytes of a result preview written to the conversation log.
const RESULT_PREVIEW_BYTES: usize = 500;

/// Head of `text`, at most [`RESULT_PREVIEW_BYTES`], cut on a char boundary.
fn preview(text: &str) -> &str {
    if text.len() <= RESULT_PREVIEW_BYTES {
        return text;
    }
    let mut end = RESULT_PREVIEW_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

pub struct ToolDispatcher {
    session_id: SessionId,
    tools: HashMap<String, ToolRegistration>,
    gate: Arc<PermissionGate>,
    validator: DefaultToolValidator,
    cancel: CancellationToken,
    logger: Arc<dyn ConversationLogger>,
}

impl ToolDispatcher {
    /// Build a dispatcher over a fixed set of registrations.
    ///
    /// When two registrations share a name the later one wins.
    pub fn new(
        session_id: SessionId,
        tools: Vec<ToolRegistration>,
        gate: Arc<PermissionGate>,
        cancel: CancellationToken,
        logger: Arc<dyn ConversationLogger>,
    ) -> Self {
        let mut map = HashMap::with_capacity(tools.len());
        for tool in tools {
            let name = tool.name().to_string();
            if map.insert(name.clone(), tool).is_some() {
                warn!(session_id = %session_id, "Tool '{}' registered twice; keeping the last", name);
            }
        }
        Self {
            session_id,
            tools: map,
            gate,
            validator: DefaultToolValidator,
            cancel,
            logger,
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Dispatch one call.
    ///
    /// Returns `Err` only when the permission policy itself failed; every
    /// other outcome, including cancellation, is a [`ToolResult`].
    pub async fn dispatch(&self, call: &ToolCall) -> Result<ToolResult, PolicyError> {
        let result = self.run(call).await?;
        self.log_result(&result);
        Ok(result)
    }

    async fn run(&self, call: &ToolCall) -> Result<ToolResult, PolicyError> {
        let Some(registration) = self.tools.get(&call.tool_name) else {
            warn!(
                session_id = %self.session_id,
                "Tool call {} names unknown tool '{}'",
                call.id, call.tool_name
            );
            return Ok(self.failure(call, ToolFailure::unknown_tool(&call.tool_name)));
        };

        self.logger.log(ConversationEvent::new(
            event_types::TOOL_CALL,
            serde_json::json!({
                "session_id": self.session_id.as_str(),
                "tool_call_id": call.id,
                "tool": call.tool_name,
                "args": call.arguments,
            }),
        ));

        let request = PermissionRequest::custom_tool(call);
        let decision = match self.gate.request(&request, Some(call.id.clone())).await {
            Ok(decision) => decision,
            Err(GateError::Cancelled) => return Ok(self.failure(call, ToolFailure::cancelled())),
            Err(GateError::Policy(e)) => return Err(e),
        };
        if !decision.is_approved() {
            debug!(
                session_id = %self.session_id,
                "Tool call {} ({}) denied: {}",
                call.id, call.tool_name, decision
            );
            return Ok(self.failure(call, ToolFailure::permission_denied(decision)));
        }

        let arguments = match &call.arguments {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        let normalized = call.clone().with_arguments(arguments.clone());
        let handler = registration.handler();
        if let Err(reason) = self
            .validator
            .validate(&normalized, registration.definition())
            .and_then(|_| handler.check_arguments(&arguments))
        {
            debug!(
                session_id = %self.session_id,
                "Tool call {} rejected: {}",
                call.id, reason
            );
            return Ok(self.failure(call, ToolFailure::bad_arguments(&call.tool_name, reason)));
        }

        let invocation = ToolInvocation {
            session_id: self.session_id.clone(),
            tool_call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
        };
        let started = Instant::now();
        let mut task = tokio::spawn(async move { handler.call(invocation, arguments).await });

        let joined = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                task.abort();
                debug!(session_id = %self.session_id, "Tool call {} cancelled", call.id);
                return Ok(self.failure(call, ToolFailure::cancelled()));
            }
            joined = &mut task => joined,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match joined {
            Ok(Ok(output)) => {
                let content = ToolContent {
                    text: registration.serialize(&output.value),
                    binary: output.binary,
                };
                ToolResult::success(&call.id, &call.tool_name, content)
            }
            Ok(Err(err)) => {
                warn!(
                    session_id = %self.session_id,
                    tool = %call.tool_name,
                    tool_call_id = %call.id,
                    detail = err.detail(),
                    "Tool handler failed"
                );
                self.failure(call, ToolFailure::execution_failed())
            }
            Err(join_err) => {
                warn!(
                    session_id = %self.session_id,
                    tool = %call.tool_name,
                    tool_call_id = %call.id,
                    panicked = join_err.is_panic(),
                    "Tool handler task did not complete"
                );
                self.failure(call, ToolFailure::execution_failed())
            }
        };

        Ok(result.with_duration(duration_ms))
    }

    fn failure(&self, call: &ToolCall, failure: ToolFailure) -> ToolResult {
        ToolResult::failure(&call.id, &call.tool_name, failure)
    }

    fn log_result(&self, result: &ToolResult) {
        let mut payload = serde_json::json!({
            "session_id": self.session_id.as_str(),
            "tool_call_id": result.tool_call_id,
            "tool": result.tool_name,
            "success": result.is_success(),
            "output_preview": preview(result.text_for_llm()),
        });
        if let Some(kind) = result.failure_kind() {
            payload["failure"] = serde_json::json!(kind.code());
        }
        if let Some(ms) = result.duration_ms {
            payload["duration_ms"] = serde_json::json!(ms);
        }
        self.logger
            .log(ConversationEvent::new(event_types::TOOL_RESULT, payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::conversation_logger::NoConversationLogger;
    use crate::ports::permission_policy::{ApproveAll, DenyAll, PermissionPolicy, from_fn};
    use crate::ports::tool_handler::{ToolError, ToolOutput};
    use harness_domain::{
        BinaryContent, ParamType, PermissionDecision, ToolDefinition, ToolFailureKind,
        ToolParameter,
    };
    use serde::Deserialize;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Deserialize)]
    struct EncryptArgs {
        input: String,
    }

    fn encrypt_tool() -> ToolRegistration {
        ToolRegistration::typed(
            ToolDefinition::new("encrypt_string", "Encrypts a string")
                .with_parameter(ToolParameter::new("input", "String to encrypt", true)),
            |_inv, args: EncryptArgs| async move { Ok(ToolOutput::text(args.input.to_uppercase())) },
        )
    }

    fn dispatcher(
        tools: Vec<ToolRegistration>,
        policy: Option<Arc<dyn PermissionPolicy>>,
    ) -> ToolDispatcher {
        let cancel = CancellationToken::new();
        let logger: Arc<dyn ConversationLogger> = Arc::new(NoConversationLogger);
        let gate = Arc::new(PermissionGate::new(
            SessionId::new("s1"),
            policy,
            cancel.clone(),
            logger.clone(),
        ));
        ToolDispatcher::new(SessionId::new("s1"), tools, gate, cancel, logger)
    }

    #[tokio::test]
    async fn test_encrypt_string_success() {
        let d = dispatcher(vec![encrypt_tool()], Some(Arc::new(ApproveAll)));
        let call = ToolCall::new("tc-1", "encrypt_string").with_arg("input", "Hello");
        let result = d.dispatch(&call).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.tool_call_id, "tc-1");
        assert_eq!(result.text_for_llm(), "HELLO");
    }

    #[tokio::test]
    async fn test_unknown_tool_skips_permission() {
        let asked = Arc::new(AtomicBool::new(false));
        let flag = asked.clone();
        let policy = from_fn(move |_req, _inv| {
            flag.store(true, Ordering::SeqCst);
            async { Ok(PermissionDecision::Approved) }
        });
        let d = dispatcher(vec![encrypt_tool()], Some(policy));
        let result = d
            .dispatch(&ToolCall::new("tc-1", "decrypt_string"))
            .await
            .unwrap();
        assert_eq!(result.failure_kind(), Some(&ToolFailureKind::UnknownTool));
        assert!(!asked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_denied_handler_never_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let tool = ToolRegistration::from_fn(
            ToolDefinition::new("mutate", "Flips a flag"),
            move |_inv, _args| {
                let flag = flag.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(ToolOutput::text("done"))
                }
            },
        );
        let d = dispatcher(vec![tool], Some(Arc::new(DenyAll)));
        let result = d.dispatch(&ToolCall::new("tc-1", "mutate")).await.unwrap();
        assert_eq!(
            result.failure_kind(),
            Some(&ToolFailureKind::PermissionDenied {
                decision: PermissionDecision::DeniedByRules
            })
        );
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_handler_error_does_not_leak() {
        let tool = ToolRegistration::from_fn(
            ToolDefinition::new("get_user_location", "Where the user is")
                .with_parameter(ToolParameter::new("user", "User name", false)),
            |_inv, _args| async { Err(ToolError::new("secret: user is in Melbourne")) },
        );
        let d = dispatcher(vec![tool], Some(Arc::new(ApproveAll)));
        let result = d
            .dispatch(&ToolCall::new("tc-1", "get_user_location"))
            .await
            .unwrap();
        assert_eq!(result.failure_kind(), Some(&ToolFailureKind::ExecutionFailed));
        assert_eq!(result.text_for_llm(), "tool execution failed");
        assert!(!format!("{:?}", result).contains("Melbourne"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let tool = ToolRegistration::from_fn(
            ToolDefinition::new("explode", "Panics"),
            |_inv, _args| async { panic!("Melbourne") },
        );
        let d = dispatcher(vec![tool], Some(Arc::new(ApproveAll)));
        let result = d.dispatch(&ToolCall::new("tc-1", "explode")).await.unwrap();
        assert_eq!(result.failure_kind(), Some(&ToolFailureKind::ExecutionFailed));
        assert!(!result.text_for_llm().contains("Melbourne"));
    }

    #[tokio::test]
    async fn test_bad_arguments_never_invoke_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let tool = ToolRegistration::from_fn(
            ToolDefinition::new("count", "Counts")
                .with_parameter(ToolParameter::new("n", "How many", true).with_type(ParamType::Integer)),
            move |_inv, _args| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(ToolOutput::text("ok")) }
            },
        );
        let d = dispatcher(vec![tool, encrypt_tool()], Some(Arc::new(ApproveAll)));

        let wrong_type = ToolCall::new("tc-1", "count").with_arg("n", "three");
        let result = d.dispatch(&wrong_type).await.unwrap();
        assert_eq!(result.failure_kind(), Some(&ToolFailureKind::BadToolArguments));

        let missing = ToolCall::new("tc-2", "encrypt_string");
        let result = d.dispatch(&missing).await.unwrap();
        assert_eq!(result.failure_kind(), Some(&ToolFailureKind::BadToolArguments));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_policy_failure_is_an_error() {
        let policy = from_fn(|_req, _inv| async {
            Err::<PermissionDecision, _>(PolicyError::new("policy crashed"))
        });
        let d = dispatcher(vec![encrypt_tool()], Some(policy));
        let call = ToolCall::new("tc-1", "encrypt_string").with_arg("input", "Hello");
        let err = d.dispatch(&call).await.unwrap_err();
        assert_eq!(err.message(), "policy crashed");
    }

    #[tokio::test]
    async fn test_binary_output_travels_separately() {
        let tool = ToolRegistration::from_fn(ToolDefinition::new("snapshot", "Image"), |_inv, _args| async {
            Ok(ToolOutput::text("see image")
                .with_binary(BinaryContent::new(vec![0x89, 0x50], "image/png")))
        });
        let d = dispatcher(vec![tool], Some(Arc::new(ApproveAll)));
        let result = d.dispatch(&ToolCall::new("tc-1", "snapshot")).await.unwrap();
        let content = result.content().unwrap();
        assert_eq!(content.text, "see image");
        assert_eq!(content.binary[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_null_arguments_treated_as_empty() {
        let tool = ToolRegistration::from_fn(ToolDefinition::new("ping", "Pong"), |_inv, args| async move {
            Ok(ToolOutput::json(args))
        });
        let d = dispatcher(vec![tool], Some(Arc::new(ApproveAll)));
        let call = ToolCall::new("tc-1", "ping").with_arguments(serde_json::Value::Null);
        let result = d.dispatch(&call).await.unwrap();
        assert_eq!(result.text_for_llm(), "{}");
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        assert_eq!(preview("short"), "short");

        // 'ü' is two bytes; an even cut would split the last one.
        let text = format!("a{}", "ü".repeat(RESULT_PREVIEW_BYTES));
        let cut = preview(&text);
        assert_eq!(cut.len(), RESULT_PREVIEW_BYTES - 1);
        assert!(cut.ends_with('ü'));
    }
}
