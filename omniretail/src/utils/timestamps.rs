//! Timestamp formatting for responses and logs.

use chrono::{DateTime, Utc};
use serde::Serializer;

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Formats a timestamp as ISO 8601 with microseconds and an explicit
/// offset: `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`.
#[must_use]
pub fn format_iso(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC time in [`format_iso`] form.
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso(&Utc::now())
}

/// Serde adapter writing a timestamp in [`format_iso`] form.
pub fn serialize_iso<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_iso(ts))
}
