//! Mutation timestamps.
//!
//! Timestamps are kept at microsecond precision so that values round-trip
//! unchanged through PostgreSQL `TIMESTAMPTZ` columns and through cursors.

use chrono::{Duration, SubsecRound, Utc};

use crate::types::Timestamp;

/// Current time truncated to microseconds.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

/// Issue a timestamp strictly greater than `last`.
///
/// Falls back to `last + 1µs` when the wall clock has not advanced (or went
/// backwards) since the previous issue.
pub fn tick(last: Option<Timestamp>) -> Timestamp {
    let now = now();
    match last {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    }
}
