//! Event-Stream Frame Parser
//!
//! Incremental parser for the line-oriented `data: ` framing used by the
//! chat endpoint:
//!
//! ```text
//! data: {"content": "partial text"}
//! data: {"content": "more text"}
//! data: {"done": true}
//! data: [DONE]
//! ```
//!
//! Bytes arrive in arbitrary chunks. The parser decodes UTF-8 incrementally
//! (a code point split across chunks is held back), splits on `\n`, and keeps
//! the trailing partial line until more data arrives. Chunk boundaries never
//! change the produced events.
//!
//! # Payload rules
//!
//! - `[DONE]` ends the stream.
//! - A JSON object yields its non-empty string `content` as a delta, then
//!   ends the stream if `done` is truthy.
//! - Other JSON values (numbers, booleans, strings, arrays) carry no content
//!   and are skipped. `null` is the exception and counts as plain text.
//! - Anything else that is non-empty is plain-text content, verbatim.
//! - Lines without the `data: ` prefix are ignored.
//!
//! After the terminal event the parser ignores all further input until
//! [`FrameParser::reset`].

use serde_json::Value;

/// Line prefix that marks a frame
pub const DATA_PREFIX: &str = "data: ";

/// Payload that terminates the stream outside the JSON format
pub const DONE_SENTINEL: &str = "[DONE]";

/// An event parsed out of the stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    /// A fragment of assistant output
    ContentDelta(String),
    /// The stream is complete
    Done,
}

/// Stateful incremental frame parser (one per session)
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Undecoded trailing bytes of an incomplete UTF-8 sequence
    pending_bytes: Vec<u8>,
    /// Decoded text after the last newline
    line_buffer: String,
    /// A terminal event has been produced
    done: bool,
}

impl FrameParser {
    /// Create a parser
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal event has been produced
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a raw byte chunk
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<FrameEvent> {
        if self.done {
            return Vec::new();
        }
        self.pending_bytes.extend_from_slice(chunk);
        let text = decode_utf8_prefix(&mut self.pending_bytes);
        self.push_str(&text)
    }

    /// Feed already decoded text
    pub fn push_str(&mut self, text: &str) -> Vec<FrameEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.line_buffer.push_str(text);
        let Some(last_newline) = self.line_buffer.rfind('\n') else {
            return events;
        };

        let remainder = self.line_buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.line_buffer, remainder);

        for line in complete.split('\n') {
            if parse_line(line, &mut events) {
                self.done = true;
                self.line_buffer.clear();
                self.pending_bytes.clear();
                break;
            }
        }

        events
    }

    /// Signal end of input
    ///
    /// An unterminated trailing line is an incomplete frame and is dropped.
    /// Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.line_buffer.len() + self.pending_bytes.len();
        if discarded > 0 {
            tracing::debug!(bytes = discarded, "Discarding incomplete trailing frame");
        }
        self.line_buffer.clear();
        self.pending_bytes.clear();
        discarded
    }

    /// Clear all state so the parser can serve a new session
    pub fn reset(&mut self) {
        self.pending_bytes.clear();
        self.line_buffer.clear();
        self.done = false;
    }
}

/// Parse one complete line, pushing events. Returns `true` on a terminal event.
fn parse_line(line: &str, events: &mut Vec<FrameEvent>) -> bool {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return false;
    };
    let payload = rest.trim();

    if payload == DONE_SENTINEL {
        events.push(FrameEvent::Done);
        return true;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(record)) => {
            if let Some(Value::String(content)) = record.get("content") {
                if !content.is_empty() {
                    events.push(FrameEvent::ContentDelta(content.clone()));
                }
            }
            if record.get("done").is_some_and(is_truthy) {
                events.push(FrameEvent::Done);
                return true;
            }
        }
        // Valid JSON without fields
        Ok(Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Array(_)) => {}
        // Not JSON (or `null`): plain-text server
        Ok(Value::Null) | Err(_) => {
            if !payload.is_empty() {
                events.push(FrameEvent::ContentDelta(payload.to_string()));
            }
        }
    }

    false
}

/// JSON truthiness as the reference servers use it for the `done` flag
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Decode the longest valid prefix of `bytes`, leaving an incomplete
/// trailing sequence in place. Invalid sequences become U+FFFD.
fn decode_utf8_prefix(bytes: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut start = 0;

    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(valid) => {
                out.push_str(valid);
                start = bytes.len();
                break;
            }
            Err(e) => {
                let valid_end = start + e.valid_up_to();
                // valid_up_to guarantees this range is valid UTF-8
                out.push_str(&String::from_utf8_lossy(&bytes[start..valid_end]));
                match e.error_len() {
                    Some(invalid_len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + invalid_len;
                    }
                    None => {
                        // Incomplete sequence at the end: wait for more bytes
                        start = valid_end;
                        break;
                    }
                }
            }
        }
    }

    bytes.drain(..start);
    out
}
