//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamp `days` days before `reference`
pub fn days_before(reference: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    reference - Duration::days(days)
}
