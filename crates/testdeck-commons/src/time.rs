//! Timestamp helpers.
//!
//! All timestamps in the data model are Unix milliseconds stored as `i64`.

use chrono::Utc;

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
