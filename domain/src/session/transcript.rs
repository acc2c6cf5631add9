//! Append-only conversation transcript.
//!
//! [`Transcript`] is the only place messages are stored for a session. It
//! enforces the ordering rules the backend relies on:
//!
//! - a tool call id is issued once per session, never reused
//! - a tool message answers a call that an earlier assistant message issued
//! - each issued call is answered at most once

use super::entities::{Message, Role};
use crate::core::error::DomainError;
use crate::tool::value_objects::ToolResult;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    issued: HashSet<String>,
    answered: HashSet<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript from backend history.
    ///
    /// Every message is appended as if it arrived live. Messages that would
    /// break an invariant are skipped and returned alongside the transcript,
    /// so one malformed history entry does not make a session unresumable.
    pub fn from_history(history: impl IntoIterator<Item = Message>) -> (Self, Vec<DomainError>) {
        let mut transcript = Self::new();
        let mut skipped = Vec::new();
        for message in history {
            if let Err(e) = transcript.append(message) {
                skipped.push(e);
            }
        }
        (transcript, skipped)
    }

    /// Append any message, routing to the role-specific checks.
    pub fn append(&mut self, message: Message) -> Result<(), DomainError> {
        match message.role {
            Role::User => {
                if !message.tool_calls.is_empty() || message.tool_call_id.is_some() {
                    return Err(DomainError::InvalidMessage(
                        "user message cannot carry tool data".to_string(),
                    ));
                }
                self.messages.push(message);
                Ok(())
            }
            Role::Assistant => self.push_assistant(message),
            Role::Tool => {
                let Some(id) = message.tool_call_id.clone() else {
                    return Err(DomainError::InvalidMessage(
                        "tool message without tool_call_id".to_string(),
                    ));
                };
                self.check_answerable(&id)?;
                self.answered.insert(id);
                self.messages.push(message);
                Ok(())
            }
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, message: Message) -> Result<(), DomainError> {
        if message.role != Role::Assistant {
            return Err(DomainError::InvalidMessage(format!(
                "expected assistant message, got {}",
                message.role
            )));
        }

        let mut seen = HashSet::new();
        for call in &message.tool_calls {
            if self.issued.contains(&call.id) || !seen.insert(call.id.as_str()) {
                return Err(DomainError::DuplicateToolCallId(call.id.clone()));
            }
        }

        for call in &message.tool_calls {
            self.issued.insert(call.id.clone());
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn push_tool_result(&mut self, result: &ToolResult) -> Result<(), DomainError> {
        self.append(Message::tool(result))
    }

    fn check_answerable(&self, id: &str) -> Result<(), DomainError> {
        if !self.issued.contains(id) {
            return Err(DomainError::UnknownToolCallId(id.to_string()));
        }
        if self.answered.contains(id) {
            return Err(DomainError::ToolCallAlreadyAnswered(id.to_string()));
        }
        Ok(())
    }

    /// Whether a call id has already been issued in this session.
    pub fn is_issued(&self, id: &str) -> bool {
        self.issued.contains(id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::entities::ToolCall;
    use crate::tool::value_objects::{ToolContent, ToolFailure};

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "encrypt_string").with_arg("input", "Hello")
    }

    #[test]
    fn test_tool_result_after_call_is_accepted() {
        let mut transcript = Transcript::new();
        transcript.push_user("encrypt Hello");
        transcript
            .push_assistant(Message::assistant_with_tools(None, vec![call("tc-1")]))
            .unwrap();
        transcript
            .push_tool_result(&ToolResult::success(
                "tc-1",
                "encrypt_string",
                ToolContent::text("HELLO"),
            ))
            .unwrap();
        transcript
            .push_assistant(Message::assistant("HELLO"))
            .unwrap();

        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.messages()[3].text(), Some("HELLO"));
    }

    #[test]
    fn test_tool_result_before_call_is_rejected() {
        let mut transcript = Transcript::new();
        let err = transcript
            .push_tool_result(&ToolResult::failure(
                "tc-1",
                "encrypt_string",
                ToolFailure::execution_failed(),
            ))
            .unwrap_err();
        assert_eq!(err, DomainError::UnknownToolCallId("tc-1".to_string()));
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_call_id_reuse_is_rejected() {
        let mut transcript = Transcript::new();
        transcript
            .push_assistant(Message::assistant_with_tools(None, vec![call("tc-1")]))
            .unwrap();
        let err = transcript
            .push_assistant(Message::assistant_with_tools(None, vec![call("tc-1")]))
            .unwrap_err();
        assert_eq!(err, DomainError::DuplicateToolCallId("tc-1".to_string()));
    }

    #[test]
    fn test_duplicate_ids_within_one_message_are_rejected() {
        let mut transcript = Transcript::new();
        let err = transcript
            .push_assistant(Message::assistant_with_tools(
                None,
                vec![call("tc-1"), call("tc-1")],
            ))
            .unwrap_err();
        assert_eq!(err, DomainError::DuplicateToolCallId("tc-1".to_string()));
        assert!(!transcript.is_issued("tc-1"));
    }

    #[test]
    fn test_double_answer_is_rejected() {
        let mut transcript = Transcript::new();
        transcript
            .push_assistant(Message::assistant_with_tools(None, vec![call("tc-1")]))
            .unwrap();
        let result = ToolResult::success("tc-1", "encrypt_string", ToolContent::text("A"));
        transcript.push_tool_result(&result).unwrap();
        let err = transcript.push_tool_result(&result).unwrap_err();
        assert_eq!(err, DomainError::ToolCallAlreadyAnswered("tc-1".to_string()));
    }

    #[test]
    fn test_each_call_of_a_batch_is_answerable_once() {
        let mut transcript = Transcript::new();
        transcript
            .push_assistant(Message::assistant_with_tools(
                None,
                vec![call("tc-1"), call("tc-2")],
            ))
            .unwrap();
        transcript
            .push_tool_result(&ToolResult::success(
                "tc-2",
                "encrypt_string",
                ToolContent::text("B"),
            ))
            .unwrap();
        transcript
            .push_tool_result(&ToolResult::success(
                "tc-1",
                "encrypt_string",
                ToolContent::text("A"),
            ))
            .unwrap();
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn test_from_history_skips_invalid_entries() {
        let history = vec![
            Message::user("The secret word is PINEAPPLE"),
            Message {
                role: Role::Tool,
                content: Some("orphan".to_string()),
                tool_calls: Vec::new(),
                tool_call_id: Some("tc-404".to_string()),
            },
            Message::assistant("Noted."),
        ];
        let (transcript, skipped) = Transcript::from_history(history);
        assert_eq!(transcript.len(), 2);
        assert_eq!(
            skipped,
            vec![DomainError::UnknownToolCallId("tc-404".to_string())]
        );
        assert_eq!(transcript.messages()[1].text(), Some("Noted."));
    }
}
