use axum::routing::get;
use axum::Router;

use crate::handlers::formats;
use crate::state::AppState;

/// Routes mounted at `/formats`.
///
/// ```text
/// GET    /image           -> list_image_formats
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/image", get(formats::list_image_formats))
}
