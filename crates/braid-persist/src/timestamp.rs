//! Record timestamps are stored as RFC 3339 strings. A single fixed format
//! (UTC, millisecond precision, `Z` suffix) keeps lexicographic order equal
//! to chronological order, so the store can range-scan on them directly.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};

pub fn now_iso() -> String {
    to_iso(Utc::now())
}

pub fn to_iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compare two stored timestamps. A side that fails to parse compares equal,
/// so a corrupt record reorders nothing and never aborts a read path.
pub fn cmp_created_at(a: &str, b: &str) -> Ordering {
    match (parse_iso(a), parse_iso(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => Ordering::Equal,
    }
}
