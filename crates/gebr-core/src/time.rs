//! Time utilities

use chrono::{SecondsFormat, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as an ISO-8601 string with microseconds, e.g.
/// `2024-03-01T12:00:00.000000Z`.
pub fn iso8601_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 on a clock set before the Unix epoch.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Milliseconds elapsed since a timestamp; 0 if it lies in the future
pub fn elapsed_millis(since: u64) -> u64 {
    current_time_millis().saturating_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_iso8601_parses_back() {
        let stamp = iso8601_now();
        assert!(stamp.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[test]
    fn test_elapsed_millis_future_time() {
        let future = current_time_millis() + 1_000_000;
        assert_eq!(elapsed_millis(future), 0);
    }
}
