//! Time and timestamp utilities

use chrono::Utc;

/// Get current Unix timestamp in milliseconds
pub fn current_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Milliseconds elapsed since `start` (a value from `current_timestamp_millis`)
pub fn elapsed_millis(start: i64) -> i64 {
    (current_timestamp_millis() - start).max(0)
}
