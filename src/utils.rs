use chrono::{DateTime, Utc};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamps are written as RFC 3339 text so they read back the same way
/// regardless of the SQLite column affinity.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}
