//! Shared response envelope types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope. Use [`DataResponse`]
//! instead of ad-hoc `serde_json::json!({ "data": ... })`.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// A time-limited link to a converted image.
///
/// The API never proxies the bytes; clients fetch them from `url` directly.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadHandle {
    pub url: String,
    /// Original filename with the target extension.
    pub filename: String,
    pub expires_at: DateTime<Utc>,
}
