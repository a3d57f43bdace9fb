//! Small shared helpers.

pub mod timestamps;

pub use timestamps::{format_iso, iso_timestamp, serialize_iso, Timestamp};
