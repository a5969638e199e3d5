// ABOUTME: Incremental JSON scanning: decode one whole value at an offset and report where it ended.
// ABOUTME: Used to pull JSON arguments out of inline script calls without regex over nested braces.

use serde_json::Value;

/// Decode a single JSON value starting at byte `offset` of `text`.
///
/// Leading whitespace is skipped. Returns the value and the byte offset just
/// past it, or `None` if no complete value starts there.
pub fn decode_at(text: &str, offset: usize) -> Option<(Value, usize)> {
    let rest = text.get(offset..)?;
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Some((value, offset + stream.byte_offset())),
        _ => None,
    }
}

/// Skip whitespace from `offset`, then consume `expected`.
///
/// Returns the offset just past `expected`, or `None` if another character
/// (or the end of input) comes first.
pub fn expect_char(text: &str, offset: usize, expected: char) -> Option<usize> {
    let rest = text.get(offset..)?;
    let trimmed = rest.trim_start();
    let skipped = rest.len() - trimmed.len();
    trimmed
        .starts_with(expected)
        .then(|| offset + skipped + expected.len_utf8())
}
