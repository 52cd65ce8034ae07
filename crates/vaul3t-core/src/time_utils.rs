/// Returns the current Unix timestamp in seconds.
pub fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Returns true once `now_unix` has moved strictly past `deadline_unix`.
pub fn is_past_deadline(deadline_unix: u64, now_unix: u64) -> bool {
    now_unix > deadline_unix
}

/// Seconds remaining until `deadline_unix`, zero when it already passed.
pub fn seconds_until(deadline_unix: u64, now_unix: u64) -> u64 {
    deadline_unix.saturating_sub(now_unix)
}
