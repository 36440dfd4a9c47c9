//! Time helpers backed by `chrono::Utc::now()`.

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Returns the current Unix timestamp in milliseconds.
///
/// `connectedAt` and `added` fields use millisecond precision.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Age in whole seconds of a millisecond timestamp, clamped at zero.
pub fn age_secs(since_millis: i64) -> u64 {
    let delta = now_timestamp_millis().saturating_sub(since_millis);
    (delta.max(0) / 1000) as u64
}
