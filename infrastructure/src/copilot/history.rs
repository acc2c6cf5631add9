//! Conversion of `session.getMessages` events into transcript messages.
//!
//! The backend stores a session as its event log. Only the events that
//! carry conversation content become [`Message`]s:
//!
//! | Event | Message |
//! |-------|---------|
//! | `user.message` | user, `data.content` |
//! | `assistant.message` | assistant, `data.content` + `data.toolRequests` |
//! | `tool.execution_complete` | tool, answering `data.toolCallId` |
//!
//! Everything else (deltas, reasoning, idle, usage) is dropped.

use harness_domain::{Message, Role, SessionEvent, event_kinds};
use tracing::trace;

pub fn events_to_messages(events: &[SessionEvent]) -> Vec<Message> {
    events.iter().filter_map(event_to_message).collect()
}

fn event_to_message(event: &SessionEvent) -> Option<Message> {
    match event.event_type.as_str() {
        event_kinds::USER_MESSAGE => Some(Message::user(event.content().unwrap_or_default())),
        event_kinds::ASSISTANT_MESSAGE => Some(Message::assistant_with_tools(
            event.content().map(str::to_string),
            event.tool_requests(),
        )),
        event_kinds::TOOL_EXECUTION_COMPLETE => {
            let tool_call_id = event.data.get("toolCallId").and_then(|v| v.as_str())?;
            Some(Message {
                role: Role::Tool,
                content: Some(tool_output_text(&event.data)),
                tool_calls: Vec::new(),
                tool_call_id: Some(tool_call_id.to_string()),
            })
        }
        other => {
            trace!("History: skipping {}", other);
            None
        }
    }
}

/// `data.result.content`, `data.result` as a string, or an empty string.
fn tool_output_text(data: &serde_json::Value) -> String {
    let Some(result) = data.get("result") else {
        return String::new();
    };
    if let Some(content) = result.get("content").and_then(|c| c.as_str()) {
        return content.to_string();
    }
    match result {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_domain::Transcript;
    use serde_json::json;

    fn event(kind: &str, data: serde_json::Value) -> SessionEvent {
        SessionEvent::new(kind, data)
    }

    #[test]
    fn test_conversation_events_become_messages() {
        let events = vec![
            event("session.start", json!({})),
            event("user.message", json!({"content": "Remember PINEAPPLE"})),
            event(
                "assistant.message",
                json!({"content": "", "toolRequests": [
                    {"toolCallId": "tc-1", "name": "encrypt_string", "arguments": {"input": "x"}}
                ]}),
            ),
            event(
                "tool.execution_complete",
                json!({"toolCallId": "tc-1", "success": true, "result": {"content": "X"}}),
            ),
            event("assistant.message_delta", json!({"deltaContent": "Got"})),
            event("assistant.message", json!({"content": "Got it"})),
            event("session.idle", json!({})),
        ];

        let messages = events_to_messages(&events);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].text(), Some("Remember PINEAPPLE"));
        assert_eq!(messages[1].tool_calls[0].id, "tc-1");
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("tc-1"));
        assert_eq!(messages[2].text(), Some("X"));
        assert_eq!(messages[3].text(), Some("Got it"));

        let (transcript, skipped) = Transcript::from_history(messages);
        assert!(skipped.is_empty());
        assert_eq!(transcript.len(), 4);
    }

    #[test]
    fn test_tool_completion_without_id_is_dropped() {
        let events = vec![event("tool.execution_complete", json!({"result": "ok"}))];
        assert!(events_to_messages(&events).is_empty());
    }

    #[test]
    fn test_tool_output_fallbacks() {
        assert_eq!(tool_output_text(&json!({"result": "plain"})), "plain");
        assert_eq!(tool_output_text(&json!({"result": {"n": 1}})), r#"{"n":1}"#);
        assert_eq!(tool_output_text(&json!({})), "");
    }
}
