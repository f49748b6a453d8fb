//! Incremental parser for the SSE wire protocol.
//!
//! The transport delivers UTF-8 text in arbitrary chunk boundaries; some
//! producers split a single logical event across multiple writes, so the
//! parser carries partial lines and partial field blocks between feeds.
//!
//! Recognized lines: `id:<v>`, `event:<v>`, `data:<v>` (multiple `data:`
//! lines concatenate with `\n` in arrival order), `:` comments and blank
//! lines. A blank or comment line terminates the pending field block and
//! emits it as one event; a block with no `data:` lines is never emitted.

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `data:` block that parsed as JSON.
    Json(Value),
    /// Raw text kept verbatim when the block is not valid JSON.
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Resumption token, when the server supplied one.
    pub id: Option<String>,
    /// Server-defined event category.
    pub event_type: Option<String>,
    pub payload: Payload,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SseParser {
    partial_line: Vec<u8>,
    event_id: Option<String>,
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one transport chunk, appending any completed events to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<StreamEvent>) {
        for &byte in chunk {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.partial_line).into_owned();
                self.partial_line.clear();
                self.push_line(&line, out);
            } else {
                self.partial_line.push(byte);
            }
        }
    }

    fn push_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            self.flush(out);
            return;
        }
        if let Some(value) = line.strip_prefix("id:") {
            self.event_id = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("event:") {
            self.event_type = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data_lines.push(value.trim().to_string());
        }
        // Unrecognized field lines are dropped, matching the producer's
        // web client.
    }

    fn flush(&mut self, out: &mut Vec<StreamEvent>) {
        if self.data_lines.is_empty() {
            return;
        }
        let data = self.data_lines.join("\n");
        let payload = match serde_json::from_str::<Value>(&data) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(data),
        };
        out.push(StreamEvent {
            id: self.event_id.take(),
            event_type: self.event_type.take(),
            payload,
            received_at: Utc::now(),
        });
        self.data_lines.clear();
    }
}
