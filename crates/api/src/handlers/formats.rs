use axum::Json;
use pixelforge_core::formats::{ImageFormat, ALL_FORMATS};

use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;

/// GET /api/v1/formats/image
///
/// The supported image formats, in advertised order.
pub async fn list_image_formats(_auth: AuthUser) -> Json<DataResponse<Vec<ImageFormat>>> {
    Json(DataResponse {
        data: ALL_FORMATS.to_vec(),
    })
}
