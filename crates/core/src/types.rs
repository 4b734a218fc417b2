//! Identifier and time aliases shared by every crate.

/// Row id of a job or queued task (Postgres `BIGSERIAL`). User ids come
/// from the token `sub` claim and use the same type.
pub type DbId = i64;

/// A `TIMESTAMPTZ` value, always UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
