//! Response normalization and error classification
//!
//! Remote endpoints wrap their payloads in a `{status, data}` envelope. A
//! successful result is unwrapped one level when it carries a `data` field;
//! failures are classified into one of the three [`RequestError`] kinds.

use serde_json::Value;

use crate::error::{RequestError, TransportFailure};

/// Status code the envelope uses for success
pub const SUCCESS_STATUS: f64 = 200.0;

/// Unwrap the envelope of a successful result.
///
/// A `data` field that is `null`, `false`, `0` or `""` does not count as a
/// payload, so the raw result is used as-is in that case.
pub fn unwrap_payload(raw: Value) -> Value {
    match raw {
        Value::Object(mut map) if map.get("data").is_some_and(is_truthy) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Classify a raw transport failure.
///
/// In priority order:
/// 1. a structured body whose `status` is present and not 200 and which carries
///    a `data` field becomes [`RequestError::Protocol`] with that data as message;
/// 2. any other structured body is passed through as [`RequestError::Transport`];
/// 3. no body at all becomes [`RequestError::Network`].
pub fn classify(failure: TransportFailure) -> RequestError {
    let Some(response) = failure.response.as_ref().filter(|r| is_truthy(&r.body)) else {
        return network_error(failure);
    };

    let status = response.body.get("status").filter(|s| !s.is_null());
    let data = response.body.get("data").filter(|d| is_truthy(d));

    match (status, data) {
        (Some(status), Some(data)) if status.as_f64() != Some(SUCCESS_STATUS) => {
            RequestError::Protocol(message_of(data))
        }
        _ => RequestError::Transport(failure),
    }
}

/// The failure's own message, or its debug form when it has none
fn network_error(failure: TransportFailure) -> RequestError {
    if failure.message.is_empty() {
        RequestError::Network(format!("{failure:?}"))
    } else {
        RequestError::Network(failure.message)
    }
}

/// String form of an envelope `data` field
fn message_of(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether a JSON value counts as present
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
