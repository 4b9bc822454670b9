//! Mapping of raw completions onto `ResultEnvelope` values.
//!
//! # Design
//! Classification is a pure function of the completion (status, body,
//! transport error) and the configured `BodyPolicy`, so the same input always
//! yields the same `ErrorKind`. Checks run in a fixed order:
//!
//! 1. authentication rejection (transport flag or HTTP 401)
//! 2. server-reported `message`, with or without an `errors` field
//! 3. transport failure
//! 4. non-2xx status without a usable payload
//! 5. success, decoding `T` from the payload
//!
//! A body that is not valid JSON is read as an empty object under
//! `BodyPolicy::Lenient`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::BodyPolicy;
use crate::envelope::ResultEnvelope;
use crate::error::{ErrorInfo, ErrorKind, TransportError};
use crate::inflight::Completion;

const MESSAGE_FIELD: &str = "message";
const ERRORS_FIELD: &str = "errors";

/// Classify a completion and decode the success payload as `T`.
pub fn classify<T: DeserializeOwned>(completion: Completion, policy: BodyPolicy) -> ResultEnvelope<T> {
    let Completion {
        status,
        body,
        error,
    } = completion;
    let (payload, malformed) = parse_body(&body);

    if let Some(info) = classify_failure(status, &payload, error.as_ref()) {
        return ResultEnvelope::Failure(info);
    }

    if let Some(reason) = malformed {
        match policy {
            BodyPolicy::Strict => {
                return ResultEnvelope::Failure(ErrorInfo::new(
                    ErrorKind::UnknownError,
                    format!("malformed response body: {reason}"),
                ));
            }
            BodyPolicy::Lenient => {
                tracing::warn!(%reason, "response body is not valid JSON, reading it as an empty object");
            }
        }
    }

    decode(payload)
}

/// Parse a response body. Empty bodies and parse failures both yield an empty
/// object; only the latter reports a reason.
fn parse_body(body: &str) -> (Value, Option<String>) {
    if body.trim().is_empty() {
        return (empty_object(), None);
    }
    match serde_json::from_str(body) {
        Ok(value) => (value, None),
        Err(err) => (empty_object(), Some(err.to_string())),
    }
}

fn classify_failure(
    status: Option<u16>,
    payload: &Value,
    error: Option<&TransportError>,
) -> Option<ErrorInfo> {
    let message = server_message(payload);
    let errors = payload.get(ERRORS_FIELD);

    if status == Some(401) || error.is_some_and(TransportError::is_authentication) {
        let message = message
            .or_else(|| error.map(|e| e.message.clone()))
            .unwrap_or_else(|| "authentication required".to_string());
        return Some(
            ErrorInfo::new(ErrorKind::AuthenticationError, message)
                .with_details(errors.cloned().unwrap_or(Value::Null)),
        );
    }

    if let Some(message) = message {
        return Some(match errors {
            Some(errors) => ErrorInfo::new(ErrorKind::ValidationError, message).with_details(errors.clone()),
            None => ErrorInfo::new(ErrorKind::ServerError, message),
        });
    }

    if let Some(error) = error {
        return Some(ErrorInfo::new(ErrorKind::NetworkError, error.message.clone()));
    }

    match status {
        Some(status) if !(200..300).contains(&status) => {
            let details = if is_empty(payload) { Value::Null } else { payload.clone() };
            Some(
                ErrorInfo::new(ErrorKind::UnknownError, format!("unexpected HTTP status {status}"))
                    .with_details(details),
            )
        }
        _ => None,
    }
}

/// The server's `message` field, if the payload is an object carrying one.
fn server_message(payload: &Value) -> Option<String> {
    match payload.get(MESSAGE_FIELD)? {
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> ResultEnvelope<T> {
    let empty = is_empty(&payload);
    match T::deserialize(&payload) {
        Ok(value) => ResultEnvelope::Success(value),
        // Unit and optional payloads come back from empty bodies.
        Err(err) if empty => match T::deserialize(Value::Null) {
            Ok(value) => ResultEnvelope::Success(value),
            Err(_) => ResultEnvelope::Failure(decode_error(&err)),
        },
        Err(err) => ResultEnvelope::Failure(decode_error(&err)),
    }
}

fn decode_error(err: &serde_json::Error) -> ErrorInfo {
    ErrorInfo::new(
        ErrorKind::UnknownError,
        format!("response payload has an unexpected shape: {err}"),
    )
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn is_empty(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
