//! Wall-clock helpers
//!
//! The engine reasons about time in epoch milliseconds and UTC calendar
//! days. Evaluators take `now_ms` as a parameter so tests control time.

use chrono::Utc;

/// Current wall-clock time, Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Today's UTC calendar day as the ledger's opaque date string.
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
