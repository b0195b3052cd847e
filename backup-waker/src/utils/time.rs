//! Time formatting helpers for log lines.

use chrono::{DateTime, Local, Utc};
use std::time::Duration;

/// Local wall-clock time `after` from `from`, for "waiting until ..." logs.
pub fn local_time_after(from: DateTime<Utc>, after: Duration) -> String {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "the far future".to_string())
}
