//! Ordered text extraction for streamed event payloads.
//!
//! Workloads built on different agent frameworks emit incompatible event
//! shapes. Each shape is handled by one independent extractor; extractors are
//! tried in [`TEXT_EXTRACTORS`] order and the first match wins. Every extractor
//! is total: an unrecognized payload yields `None`, never an error.

use serde_json::Value;

/// Classification of a single JSON event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Text(String),
    /// Structural event carrying no conversation content.
    Skip,
    Error {
        summary: String,
        message: Option<String>,
    },
}

pub type TextExtractor = fn(&Value) -> Option<String>;

/// Extractors in priority order, keyed by the shape they recognize.
pub const TEXT_EXTRACTORS: &[(&str, TextExtractor)] = &[
    ("event.contentBlockDelta.delta.text", content_block_delta),
    ("data", flat_data),
    ("text", flat_text),
    ("content", content_field),
    ("delta.text", delta_text),
    ("choices[0].delta.content", chat_completion_delta),
];

const CONTROL_KEYS: &[&str] = &["init_event_loop", "start", "start_event_loop"];
const CONTROL_EVENT_KEYS: &[&str] = &["messageStart", "messageStop", "contentBlockStop"];

/// Markers of a framework object repr leaking into the stream.
pub const REPR_MARKERS: &[&str] = &["'data':", "<strands."];

/// Classify an event payload: error, control, or extracted text.
pub fn classify_event(value: &Value) -> Extraction {
    if let Some((summary, message)) = error_payload(value) {
        return Extraction::Error { summary, message };
    }

    if let Value::String(text) = value {
        if REPR_MARKERS.iter().any(|marker| text.contains(marker)) {
            return Extraction::Skip;
        }
        return Extraction::Text(text.clone());
    }

    if let Some(text) = content_block_delta(value) {
        return Extraction::Text(text);
    }

    if is_control_event(value) {
        return Extraction::Skip;
    }

    match extract_text(value) {
        Some(text) => Extraction::Text(text),
        None => Extraction::Skip,
    }
}

/// Run the extractor chain and return the first match.
pub fn extract_text(value: &Value) -> Option<String> {
    TEXT_EXTRACTORS
        .iter()
        .find_map(|(_, extractor)| extractor(value))
}

pub fn is_control_event(value: &Value) -> bool {
    if CONTROL_KEYS.iter().any(|key| is_truthy(value.get(*key))) {
        return true;
    }

    value.get("event").is_some_and(|event| {
        CONTROL_EVENT_KEYS
            .iter()
            .any(|key| is_truthy(event.get(*key)))
    })
}

fn error_payload(value: &Value) -> Option<(String, Option<String>)> {
    let error = value.get("error")?;
    if !is_truthy(Some(error)) {
        return None;
    }

    let summary = match error {
        Value::String(message) => message.clone(),
        _ => value.to_string(),
    };
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(ToString::to_string);
    Some((summary, message))
}

fn content_block_delta(value: &Value) -> Option<String> {
    value
        .get("event")?
        .get("contentBlockDelta")?
        .get("delta")?
        .get("text")?
        .as_str()
        .map(ToString::to_string)
}

fn flat_data(value: &Value) -> Option<String> {
    match value.get("data")? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn flat_text(value: &Value) -> Option<String> {
    non_empty_str(value.get("text")?)
}

fn content_field(value: &Value) -> Option<String> {
    match value.get("content")? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(parts) => Some(
            parts
                .iter()
                .map(|part| match part {
                    Value::String(text) => text.as_str(),
                    other => other.get("text").and_then(Value::as_str).unwrap_or(""),
                })
                .collect(),
        ),
        _ => None,
    }
}

fn delta_text(value: &Value) -> Option<String> {
    non_empty_str(value.get("delta")?.get("text")?)
}

fn chat_completion_delta(value: &Value) -> Option<String> {
    non_empty_str(
        value
            .get("choices")?
            .get(0)?
            .get("delta")?
            .get("content")?,
    )
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_event, extract_text, Extraction, TEXT_EXTRACTORS};
    use serde_json::json;

    #[test]
    fn equivalent_shapes_extract_the_same_text() {
        let shapes = [
            json!({"event": {"contentBlockDelta": {"delta": {"text": "hi"}}}}),
            json!({"data": "hi"}),
            json!({"text": "hi"}),
            json!({"content": "hi"}),
            json!({"content": [{"type": "text", "text": "h"}, "i"]}),
            json!({"delta": {"text": "hi"}}),
            json!({"choices": [{"delta": {"content": "hi"}}]}),
        ];

        for shape in shapes {
            assert_eq!(
                classify_event(&shape),
                Extraction::Text("hi".to_string()),
                "shape {shape}"
            );
        }
    }

    #[test]
    fn first_matching_extractor_wins() {
        let value = json!({"data": "from-data", "text": "from-text", "delta": {"text": "d"}});
        assert_eq!(extract_text(&value).as_deref(), Some("from-data"));
        assert_eq!(TEXT_EXTRACTORS[1].0, "data");
    }

    #[test]
    fn control_events_are_skipped() {
        assert_eq!(classify_event(&json!({"init_event_loop": true})), Extraction::Skip);
        assert_eq!(classify_event(&json!({"start": true})), Extraction::Skip);
        assert_eq!(
            classify_event(&json!({"event": {"messageStop": {"stopReason": "end_turn"}}})),
            Extraction::Skip
        );
        assert_eq!(
            classify_event(&json!({"event": {"contentBlockStop": {"index": 0}}})),
            Extraction::Skip
        );
    }

    #[test]
    fn error_payloads_are_surfaced() {
        let value = json!({"error": "boom", "message": "tool crashed"});
        assert_eq!(
            classify_event(&value),
            Extraction::Error {
                summary: "boom".to_string(),
                message: Some("tool crashed".to_string()),
            }
        );

        let structured = json!({"error": {"code": 500}});
        match classify_event(&structured) {
            Extraction::Error { summary, message } => {
                assert!(summary.contains("\"code\":500"));
                assert_eq!(message, None);
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn string_events_pass_through_unless_repr_noise() {
        assert_eq!(
            classify_event(&json!("plain words")),
            Extraction::Text("plain words".to_string())
        );
        assert_eq!(
            classify_event(&json!("{'data': 'x', 'agent': <strands.agent.Agent>}")),
            Extraction::Skip
        );
    }

    #[test]
    fn non_string_data_is_stringified() {
        assert_eq!(extract_text(&json!({"data": 42})).as_deref(), Some("42"));
        assert_eq!(extract_text(&json!({"data": null, "text": "t"})).as_deref(), Some("t"));
    }

    #[test]
    fn unknown_shapes_yield_nothing() {
        assert_eq!(extract_text(&json!({"usage": {"tokens": 3}})), None);
        assert_eq!(classify_event(&json!({"usage": {"tokens": 3}})), Extraction::Skip);
    }
}
