//! Recover a JSON object from free-form model output.
//!
//! Models wrap JSON in markdown fences, prepend prose, or trail
//! commentary. Extraction order: ```json fence, bare ``` fence, then the
//! span from the first `{` to the last `}`.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JsonRepairError {
    #[error("No JSON object found in model output")]
    NoJson,

    #[error("Invalid JSON: {0}")]
    Parse(String),
}

/// Body of the first fenced block, preferring ```json over a bare fence.
/// Unclosed fences are ignored.
fn fenced_body(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```json") {
        let body = &raw[start + 7..];
        if let Some(end) = body.find("```") {
            return Some(&body[..end]);
        }
    }
    if let Some(start) = raw.find("```") {
        let body = &raw[start + 3..];
        if let Some(end) = body.find("```") {
            return Some(&body[..end]);
        }
    }
    None
}

/// Extract and parse the JSON object embedded in `raw`.
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, JsonRepairError> {
    let trimmed = raw.trim();
    let candidate = fenced_body(trimmed).unwrap_or(trimmed);

    let start = candidate.find('{').ok_or(JsonRepairError::NoJson)?;
    let end = candidate.rfind('}').ok_or(JsonRepairError::NoJson)?;
    if end < start {
        return Err(JsonRepairError::NoJson);
    }

    serde_json::from_str(&candidate[start..=end]).map_err(|e| JsonRepairError::Parse(e.to_string()))
}

/// Non-empty trimmed string field.
pub fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// String array field; non-string and blank entries are dropped.
pub fn string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Lenient deserialization of an array of objects: invalid items are
/// skipped instead of failing the whole list.
pub fn parse_array_lenient<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
