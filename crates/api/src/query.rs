//! Shared query parameter types for API handlers.

use pixelforge_core::pagination::PageRequest;
use serde::Deserialize;

/// Page-number pagination parameters (`?page=&size=`).
///
/// Out-of-range values are clamped by [`PageRequest::new`].
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        PageRequest::new(params.page, params.size)
    }
}

/// Optional `?target_format=` on the convert endpoint, used when the form
/// does not carry a `target_format` field.
#[derive(Debug, Default, Deserialize)]
pub struct ConvertParams {
    pub target_format: Option<String>,
}

/// Token for WebSocket upgrades, where browsers cannot set headers.
#[derive(Debug, Default, Deserialize)]
pub struct WsAuthParams {
    pub token: Option<String>,
}
