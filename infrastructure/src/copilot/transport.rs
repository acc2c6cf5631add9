//! Transport layer types for Copilot CLI communication.
//!
//! This module provides the low-level framing and message classification
//! used by the [`MessageRouter`](super::router::MessageRouter)'s background
//! reader task and its serialized writer.
//!
//! Frames use LSP-style headers:
//!
//! ```text
//! Content-Length: 57\r\n
//! \r\n
//! {"jsonrpc":"2.0","method":"session.event","params":{...}}
//! ```

use crate::copilot::error::{CopilotError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Classification of an incoming JSON-RPC message.
///
/// - `Response` → oneshot correlation for pending requests
/// - `IncomingRequest` → routed to the session (`tool.call`, `permission.request`)
/// - `Notification` → session event routing
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to a request we sent (has `id`, no `method`).
    Response,
    /// An incoming request from the CLI (has `id` + `method`).
    IncomingRequest,
    /// A notification (has `method`, no `id`).
    Notification,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
///
/// A `null` id counts as absent.
pub fn classify_message(json: &serde_json::Value) -> MessageKind {
    let has_id = json.get("id").is_some_and(|v| !v.is_null());
    let has_method = json.get("method").and_then(|v| v.as_str()).is_some();

    match (has_id, has_method) {
        (true, true) => MessageKind::IncomingRequest,
        (true, false) => MessageKind::Response,
        _ => MessageKind::Notification,
    }
}

/// Append one framed message to `buf`.
pub fn encode_frame(buf: &mut Vec<u8>, body: &str) {
    buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    buf.extend_from_slice(body.as_bytes());
}

/// Read one frame body.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R, line: &mut String) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;

    loop {
        line.clear();
        let bytes_read = reader.read_line(line).await?;
        if bytes_read == 0 {
            return match content_length {
                None => Ok(None),
                Some(_) => Err(CopilotError::TransportClosed),
            };
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }

        if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
            let len = len_str.trim().parse::<usize>().map_err(|_| {
                CopilotError::UnexpectedResponse(format!("Invalid Content-Length: {}", len_str))
            })?;
            content_length = Some(len);
        }
        // Other headers (Content-Type) are ignored.
    }

    let len = content_length.unwrap_or_default();
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}
