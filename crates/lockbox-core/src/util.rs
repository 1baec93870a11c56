//! Small helpers shared by the client, the cache and the server store.

use std::time::Duration;

/// Longest server message carried into an error.
const MAX_MESSAGE_CHARS: usize = 180;

/// Trimmed text, or `None` when missing or blank.
pub fn non_empty_trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Trim a server base URL and drop trailing slashes.
///
/// Returns `None` for blank input or anything that is not `http(s)://`.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    (trimmed.starts_with("http://") || trimmed.starts_with("https://"))
        .then(|| trimmed.to_string())
}

/// Collapse whitespace and cap the length of a server message.
pub fn compact_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_MESSAGE_CHARS)
        .collect()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Tombstones deleted before this instant are past `retention`.
pub fn retention_cutoff(retention: Duration) -> i64 {
    let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_sub(retention_ms)
}
