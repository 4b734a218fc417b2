//! Route definitions for the `/jobs` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                -> list_jobs
/// POST   /convert         -> convert_image
/// GET    /status/{id}     -> get_status
/// GET    /download/{id}   -> get_download
/// ```
///
/// `max_upload_bytes` bounds the whole multipart body of `/convert`.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs))
        .route(
            "/convert",
            post(jobs::convert_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/status/{id}", get(jobs::get_status))
        .route("/download/{id}", get(jobs::get_download))
}
