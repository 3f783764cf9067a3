//! Timestamp helpers. Every persisted timestamp in the workspace is RFC 3339
//! (via `chrono`), never a bare Unix integer, so `index.json`/Redis/Postgres
//! payloads are human-readable and unambiguous about timezone.

use chrono::{DateTime, Utc};

/// The current time, to be stamped onto a newly created entity.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Nanoseconds since the Unix epoch, used as a Redis sorted-set score and as
/// half of the checkpoint ID generator's uniqueness source.
#[must_use]
pub fn now_nanos() -> u128 {
    Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .max(0) as u128
}
