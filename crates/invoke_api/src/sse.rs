use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::events::StreamPiece;
use crate::extract::{classify_event, Extraction};

const DONE_SENTINEL: &str = "[DONE]";

fn repr_data_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r#"['"]data['"]\s*:\s*['"]([^'"]*)['"]"#).expect("repr regex must compile")
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum BodyShape {
    #[default]
    Undetermined,
    EventStream,
    /// Concatenated framework object reprs with no SSE framing.
    RawRepr,
}

/// Incremental parser for SSE text streams.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    pending_bytes: Vec<u8>,
    buffer: String,
    data_lines: Vec<String>,
    shape: BodyShape,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete pieces.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamPiece> {
        self.decode_utf8(bytes);
        let mut pieces = Vec::new();

        if self.shape == BodyShape::Undetermined {
            self.shape = detect_shape(&self.buffer);
        }

        match self.shape {
            BodyShape::Undetermined => {}
            BodyShape::EventStream => self.drain_lines(&mut pieces),
            BodyShape::RawRepr => self.drain_repr(false, &mut pieces),
        }

        pieces
    }

    /// Flush whatever remains once the body ends.
    pub fn finish(&mut self) -> Vec<StreamPiece> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.buffer.push_str(&tail);
            self.pending_bytes.clear();
        }

        let mut pieces = Vec::new();
        match self.shape {
            BodyShape::EventStream | BodyShape::Undetermined
                if self.buffer.trim_start().starts_with("data:") =>
            {
                self.buffer.push('\n');
                self.drain_lines(&mut pieces);
                self.dispatch(&mut pieces);
            }
            BodyShape::EventStream => {
                self.drain_lines(&mut pieces);
                self.dispatch(&mut pieces);
            }
            BodyShape::RawRepr | BodyShape::Undetermined => self.drain_repr(true, &mut pieces),
        }
        self.buffer.clear();
        pieces
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<StreamPiece> {
        let mut parser = Self::default();
        let mut pieces = parser.feed(input.as_bytes());
        pieces.extend(parser.finish());
        pieces
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty() && self.data_lines.is_empty() && self.pending_bytes.is_empty()
    }

    fn decode_utf8(&mut self, bytes: &[u8]) {
        self.pending_bytes.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending_bytes) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.pending_bytes.clear();
            }
            Err(error) if error.error_len().is_none() => {
                // Incomplete multi-byte sequence at the tail; keep it for the next chunk.
                let valid = error.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending_bytes[..valid]).into_owned();
                self.buffer.push_str(&text);
                self.pending_bytes.drain(..valid);
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending_bytes).into_owned();
                self.buffer.push_str(&text);
                self.pending_bytes.clear();
            }
        }
    }

    fn drain_lines(&mut self, pieces: &mut Vec<StreamPiece>) {
        while let Some(split) = self.buffer.find('\n') {
            let line = self.buffer[..split].trim_end_matches('\r').to_string();
            self.buffer.drain(..=split);

            if line.is_empty() {
                self.dispatch(pieces);
                continue;
            }

            if let Some(value) = line.strip_prefix("data:") {
                self.push_data(value.trim(), pieces);
            }
            // `event:`, `id:`, `retry:` and `:` comments carry nothing we display.
        }
    }

    /// Workloads often emit one JSON object per `data:` line with no blank
    /// separator, so a complete object never waits for the end of the event.
    fn push_data(&mut self, value: &str, pieces: &mut Vec<StreamPiece>) {
        if !self.data_lines.is_empty() && is_complete_json(&self.data_lines.join("\n")) {
            self.dispatch(pieces);
        }
        self.data_lines.push(value.to_string());
        if self.data_lines.len() == 1 && is_complete_json(value) {
            self.dispatch(pieces);
        }
    }

    fn dispatch(&mut self, pieces: &mut Vec<StreamPiece>) {
        if self.data_lines.is_empty() {
            return;
        }

        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        if payload.is_empty() || payload == DONE_SENTINEL {
            return;
        }

        if let Some(piece) = map_payload(&payload) {
            pieces.push(piece);
        }
    }

    fn drain_repr(&mut self, at_end: bool, pieces: &mut Vec<StreamPiece>) {
        let end = if at_end {
            self.buffer.len()
        } else {
            match self.buffer.rfind('}') {
                Some(index) => index + 1,
                None => return,
            }
        };

        let text: String = repr_data_regex()
            .captures_iter(&self.buffer[..end])
            .filter_map(|captures| captures.get(1))
            .map(|value| value.as_str())
            .collect();

        self.buffer.drain(..end);
        if !text.is_empty() {
            pieces.push(StreamPiece::Text(text));
        }
    }
}

fn detect_shape(buffer: &str) -> BodyShape {
    let trimmed = buffer.trim_start();
    if trimmed.is_empty() {
        return BodyShape::Undetermined;
    }
    if trimmed.starts_with('{') {
        return BodyShape::RawRepr;
    }
    BodyShape::EventStream
}

fn is_complete_json(payload: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(payload),
        Ok(Value::Object(_) | Value::Array(_))
    )
}

/// Map one event's data: JSON payloads go through the extractor chain, anything
/// else is literal streamed text.
fn map_payload(payload: &str) -> Option<StreamPiece> {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return Some(StreamPiece::Text(payload.to_string()));
    };

    match classify_event(&value) {
        Extraction::Text(text) if text.is_empty() => None,
        Extraction::Text(text) => Some(StreamPiece::Text(text)),
        Extraction::Skip => None,
        Extraction::Error { summary, message } => Some(StreamPiece::Error { summary, message }),
    }
}
