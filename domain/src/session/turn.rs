//! Per-turn conversation state machine.
//!
//! ```text
//! Idle ──begin──▶ AwaitingAssistantReply ──assistant(no calls)──▶ Terminal ──idle──▶ Idle
//!                   ▲          │
//!                   │   assistant(calls)
//!                   │          ▼
//!                   └── DispatchingTools (results sent)
//! ```
//!
//! A turn with no tool calls goes straight from `AwaitingAssistantReply`
//! to `Terminal`. The backend may emit more assistant messages after a
//! terminal one (e.g. a follow-up remark); these keep the turn terminal or
//! reopen dispatching if they request tools.

use crate::core::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    AwaitingAssistantReply,
    DispatchingTools,
    Terminal,
}

impl TurnPhase {
    pub fn as_str(&self) -> &str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::AwaitingAssistantReply => "awaiting_assistant_reply",
            TurnPhase::DispatchingTools => "dispatching_tools",
            TurnPhase::Terminal => "terminal",
        }
    }

    fn invalid(self, event: &'static str) -> DomainError {
        DomainError::InvalidTurnTransition {
            from: self.as_str().to_string(),
            event,
        }
    }

    /// A prompt was transmitted.
    ///
    /// Sending while a turn is in flight is allowed: the backend queues the
    /// prompt, so the phase is left unchanged.
    pub fn begin(self) -> TurnPhase {
        match self {
            TurnPhase::Idle | TurnPhase::Terminal => TurnPhase::AwaitingAssistantReply,
            other => other,
        }
    }

    /// An assistant message arrived carrying `tool_calls` requests.
    pub fn on_assistant_message(self, tool_calls: usize) -> Result<TurnPhase, DomainError> {
        match self {
            TurnPhase::DispatchingTools => Err(self.invalid("assistant.message")),
            // A backend-initiated turn (e.g. right after resume) starts here too.
            TurnPhase::Idle | TurnPhase::AwaitingAssistantReply | TurnPhase::Terminal => {
                if tool_calls > 0 {
                    Ok(TurnPhase::DispatchingTools)
                } else {
                    Ok(TurnPhase::Terminal)
                }
            }
        }
    }

    /// Every result of the current tool batch has been written.
    pub fn on_tool_results_sent(self) -> Result<TurnPhase, DomainError> {
        match self {
            TurnPhase::DispatchingTools => Ok(TurnPhase::AwaitingAssistantReply),
            _ => Err(self.invalid("tool results sent")),
        }
    }

    /// The backend reported the turn finished (`session.idle`).
    pub fn on_idle(self) -> Result<TurnPhase, DomainError> {
        match self {
            TurnPhase::AwaitingAssistantReply | TurnPhase::Terminal => Ok(TurnPhase::Idle),
            _ => Err(self.invalid("session.idle")),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TurnPhase::Idle)
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
