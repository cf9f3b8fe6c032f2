//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current timestamp in milliseconds since the Unix epoch.
///
/// A clock set before the epoch yields 0 rather than an error; timestamps are
/// informational metadata and never drive a protocol decision.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

/// Milliseconds elapsed since `since`, saturating at zero for future timestamps.
pub fn millis_since(since: u64) -> u64 {
    current_timestamp().saturating_sub(since)
}
