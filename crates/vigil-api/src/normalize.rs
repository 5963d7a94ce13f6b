//! Response-shape normalization.
//!
//! The incident platform's endpoints are not consistent about payload
//! wrapping: a list may arrive bare, or under `incidents`, or under
//! `data`; a single incident may arrive bare, or under `incident`, or
//! under `data`; tokens come in camelCase, snake_case, or just `token`.
//! These functions pin down one precedence order for each case so the
//! rest of the codebase never duck-types a response.

use serde_json::Value;

use crate::incidents::IncidentRecord;

/// Extract a list of incident records from a fetch response.
///
/// Precedence: bare array > `incidents` key > `data` key. Anything
/// else (including a wrapped value that is not an array) yields an
/// empty list. Elements that do not look like incidents are skipped
/// individually rather than failing the whole response.
pub fn incident_list(value: &Value) -> Vec<IncidentRecord> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("incidents").or_else(|| map.get("data")) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items.iter().filter_map(incident_record).collect()
}

/// Extract a single incident record from an update response.
///
/// Precedence: `incident` key > `data` key > the value itself.
pub fn incident(value: &Value) -> Option<IncidentRecord> {
    value
        .get("incident")
        .and_then(incident_record)
        .or_else(|| value.get("data").and_then(incident_record))
        .or_else(|| incident_record(value))
}

/// Extract an (access, refresh) token pair from a login or refresh
/// response.
///
/// Access precedence: `accessToken` > `access_token` > `token`.
/// Refresh precedence: `refreshToken` > `refresh_token`; absent is
/// fine (the caller keeps whatever refresh token it already holds).
/// Returns `None` when no usable access token is present.
pub fn token_pair(value: &Value) -> Option<(String, Option<String>)> {
    let access = ["accessToken", "access_token", "token"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())?;

    let refresh = ["refreshToken", "refresh_token"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    Some((access.to_owned(), refresh))
}

/// Best-effort extraction of a human-readable error message from an
/// error response body.
pub fn error_message(value: &Value) -> Option<String> {
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_owned)
}

fn incident_record(value: &Value) -> Option<IncidentRecord> {
    serde_json::from_value(value.clone()).ok()
}
