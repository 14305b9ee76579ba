/// Returns a simple ISO 8601 timestamp (Unix epoch seconds with Z suffix).
pub fn timestamp_now() -> String {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}Z", dur.as_secs())
}

/// Milliseconds in one hour, used by throughput and the log error-rate window.
pub const HOUR_MS: f64 = 3_600_000.0;
