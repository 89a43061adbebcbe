//! Incremental decoding of the provider's SSE response body
//!
//! The provider streams `data:` lines carrying JSON payloads. This module
//! reassembles complete lines from arbitrary byte chunks and decodes each
//! line into a [`StreamEvent`]. Malformed or unrecognized lines are skipped;
//! they never abort the stream.

use serde::Deserialize;

/// Sentinel payload marking the end of an SSE stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded upstream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental fragment of assistant text
    Token(String),
    /// The reply finished normally
    Done,
    /// The stream failed; no further events follow
    Error(String),
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Token(_))
    }
}

/// Wire payload carried by a `data:` line.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePayload {
    ContentBlockDelta { delta: WireDelta },
    MessageStop,
    Error { error: WireError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

/// Decode a single SSE line into an event.
///
/// Returns `None` for lines that carry no event: anything without the
/// `data:` marker (comments, `event:` lines, keep-alive blanks), payloads
/// that fail JSON decoding, and payload types the relay does not forward.
pub fn decode_data_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<WirePayload>(payload).ok()? {
        WirePayload::ContentBlockDelta {
            delta: WireDelta::TextDelta { text },
        } => Some(StreamEvent::Token(text)),
        WirePayload::ContentBlockDelta { .. } => None,
        WirePayload::MessageStop => Some(StreamEvent::Done),
        WirePayload::Error { error } => {
            let message = if error.message.is_empty() {
                "upstream error event".to_string()
            } else {
                error.message
            };
            Some(StreamEvent::Error(message))
        }
        WirePayload::Other => None,
    }
}

/// Reassembles complete lines from arbitrary byte chunks.
///
/// Bytes are buffered until a newline arrives, so an SSE line (or a
/// multi-byte UTF-8 sequence) split across chunk boundaries decodes whole.
/// A trailing `\r` is stripped from each line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line the chunk completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}
