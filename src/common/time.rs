//! Time utilities shared by envelopes and status reporting.

use chrono::{DateTime, Utc};

/// Get the current Unix timestamp in UTC (milliseconds).
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a Unix timestamp (milliseconds) to an RFC 3339 string.
///
/// Timestamps outside chrono's representable range fall back to the
/// raw millisecond value so status output never panics.
pub fn millis_to_rfc3339(timestamp_millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(timestamp_millis) {
        Some(dt) => dt.to_rfc3339(),
        None => timestamp_millis.to_string(),
    }
}
