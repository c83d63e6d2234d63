//! Answer extraction from a raw chat-completion response body.
//!
//! The only contractually read path is `choices[0].message.content`. Checks
//! run strictly in this order and the first failing one wins:
//!
//! 1. body is not a JSON object → [`ExtractError::MalformedResponse`]
//! 2. body has an `error` key → [`ExtractError::BackendReported`]
//! 3. no `choices` → [`ExtractError::MissingChoices`]
//! 4. `choices` is empty → [`ExtractError::EmptyChoices`]
//! 5. first choice has no `message` → [`ExtractError::MissingMessage`]
//! 6. message has no `content` → [`ExtractError::MissingContent`]
//!
//! Anything past these checks is accepted, including an empty string.

use crate::error::ExtractError;
use serde_json::Value;

/// Return the answer text at `choices[0].message.content`.
///
/// A string `content` is returned verbatim. Any other JSON value (some
/// backends send `null` or structured parts) is returned as its compact
/// JSON text so the caller still sees exactly what arrived.
pub fn extract_answer(response: &Value) -> Result<String, ExtractError> {
    let body = response.as_object().ok_or(ExtractError::MalformedResponse)?;

    if let Some(err) = body.get("error") {
        return Err(ExtractError::BackendReported(error_message(err)));
    }

    let choices = body.get("choices").ok_or(ExtractError::MissingChoices)?;
    let first = match choices {
        Value::Array(items) => items.first().ok_or(ExtractError::EmptyChoices)?,
        // A non-array `choices` has no first element to read.
        _ => return Err(ExtractError::EmptyChoices),
    };

    let message = first.get("message").ok_or(ExtractError::MissingMessage)?;
    let content = message.get("content").ok_or(ExtractError::MissingContent)?;

    Ok(match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Human-readable text of an embedded `error` field.
///
/// Handles `{"error": "text"}`, `{"error": {"message": "text", ...}}`, and
/// falls back to the JSON of anything else.
pub(crate) fn error_message(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            _ => err.to_string(),
        },
        other => other.to_string(),
    }
}
