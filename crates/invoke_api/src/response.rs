use serde_json::Value;

use crate::events::JsonReply;

const REPLY_FIELDS: &[&str] = &["result", "response", "message"];

/// Unwrap a non-streaming body: `result`, `response`, `message`, then
/// `error` (with optional `traceback`), else the body itself.
pub fn unwrap_json(body: &str) -> JsonReply {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return JsonReply::Raw(body.to_owned());
    };

    if let Value::String(text) = &value {
        return JsonReply::Text(text.clone());
    }

    for field in REPLY_FIELDS {
        if let Some(reply) = value.get(*field).filter(|reply| !reply.is_null()) {
            return JsonReply::Text(display_value(reply));
        }
    }

    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        let traceback = value
            .get("traceback")
            .and_then(Value::as_str)
            .filter(|traceback| !traceback.is_empty())
            .map(ToOwned::to_owned);
        return JsonReply::Error {
            message: display_value(error),
            traceback,
        };
    }

    JsonReply::Raw(serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_owned()))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
