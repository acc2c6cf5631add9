//! JSONL file writer for conversation events.
//!
//! Each [`ConversationEvent`] becomes one line: the payload's fields plus
//! `type` and an RFC 3339 `timestamp`. The file is opened in append mode so
//! a resumed session continues the same log.

use harness_application::{ConversationEvent, ConversationLogger};
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub struct JsonlConversationLogger {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlConversationLogger {
    /// Open (or create) the log at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Merge `type` and `timestamp` into the payload. Non-object payloads are
/// nested under `data`.
fn record(event: ConversationEvent, timestamp: String) -> Value {
    let mut map = match event.payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    map.insert("type".to_string(), Value::String(event.event_type.to_string()));
    map.insert("timestamp".to_string(), Value::String(timestamp));
    Value::Object(map)
}

impl ConversationLogger for JsonlConversationLogger {
    fn log(&self, event: ConversationEvent) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let Ok(line) = serde_json::to_string(&record(event, timestamp)) else {
            return;
        };

        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        // Flushed per line: the log must survive a crash mid-turn.
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!(
                "Failed to write conversation log {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

impl Drop for JsonlConversationLogger {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_application::ports::conversation_logger::event_types;

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_events_written_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/session.jsonl");
        let logger = JsonlConversationLogger::open(&path).unwrap();

        logger.log(ConversationEvent::new(
            event_types::TOOL_CALL,
            serde_json::json!({"session_id": "s1", "tool": "encrypt_string", "tool_call_id": "tc-1"}),
        ));
        logger.log(ConversationEvent::new(
            event_types::TURN_COMPLETE,
            serde_json::json!({"session_id": "s1", "bytes": 5}),
        ));
        drop(logger);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "tool_call");
        assert_eq!(lines[0]["tool"], "encrypt_string");
        assert_eq!(lines[1]["type"], "turn_complete");
        assert!(lines.iter().all(|l| l["timestamp"].is_string()));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");

        for _ in 0..2 {
            let logger = JsonlConversationLogger::open(&path).unwrap();
            logger.log(ConversationEvent::new(
                event_types::PERMISSION_DECISION,
                serde_json::json!({"decision": "approved"}),
            ));
        }

        assert_eq!(read_lines(&path).len(), 2);
    }

    #[test]
    fn test_non_object_payload_nested_under_data() {
        let value = record(
            ConversationEvent::new("note", serde_json::json!("plain")),
            "2026-01-01T00:00:00.000Z".into(),
        );
        assert_eq!(value["type"], "note");
        assert_eq!(value["data"], "plain");
    }

    #[test]
    fn test_open_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        assert!(JsonlConversationLogger::open(blocker.join("log.jsonl")).is_err());
    }
}
