// ABOUTME: Field helpers for normalizing loosely-typed JSON payloads into record fields.
// ABOUTME: Provides pick_first_nonempty fallback chains, path lookups and ordered URL collection.

//! Field normalization helpers.
//!
//! Site payloads are schema-less JSON. These helpers read them defensively:
//! - A path lookup that hits a non-object yields `None` instead of panicking.
//! - Only strings count as text candidates; numbers, objects and nulls are skipped.
//! - Candidates are trimmed and empty strings are treated as missing.

use serde_json::{Map, Value};

/// Returns the first candidate that is a string with non-blank content, trimmed.
///
/// Returns an empty string when every candidate is absent, blank or not a string.
pub fn pick_first_nonempty<'a, I>(candidates: I) -> String
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

/// Like [`pick_first_nonempty`] for values that are already plain strings.
pub fn first_nonempty<'a, I>(candidates: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

/// Follows `path` through nested objects.
pub fn path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

/// The object at `key`, if `key` holds one.
pub fn object<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

/// The trimmed, non-empty string at `key` of `map`.
pub fn text<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// String form of a scalar identifier: strings are trimmed, numbers printed.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Appends `url` unless it is blank or already present.
pub fn push_unique(urls: &mut Vec<String>, url: &str) {
    let url = url.trim();
    if !url.is_empty() && !urls.iter().any(|u| u == url) {
        urls.push(url.to_string());
    }
}
