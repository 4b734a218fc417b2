//! Handlers for the `/jobs` resource.
//!
//! All endpoints require authentication via [`AuthUser`] and only ever see
//! the caller's own jobs.

use axum::extract::{Multipart, OriginalUri, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use pixelforge_core::error::CoreError;
use pixelforge_core::types::DbId;
use pixelforge_db::models::job::JobStatusView;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::{ConvertParams, PageParams};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Convert
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/convert
///
/// Multipart form with a `file` part and a `target_format` field (or
/// `?target_format=`). Returns 201 with the created job in `PENDING`.
pub async fn convert_image(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ConvertParams>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut target_format = params.target_format;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_owned)
                    .ok_or_else(|| AppError::BadRequest("'file' part has no filename".into()))?;
                let bytes = field.bytes().await?;
                upload = Some((filename, bytes));
            }
            Some("target_format") => {
                target_format = Some(field.text().await?);
            }
            _ => {}
        }
    }

    let (filename, bytes) = upload
        .ok_or_else(|| AppError::Core(CoreError::Validation("missing 'file' part".into())))?;
    let target_format = target_format
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Core(CoreError::Validation("target_format required".into())))?;

    let job = state
        .jobs
        .submit(auth.user_id, &filename, bytes, &target_format)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs?page=&size=
///
/// The caller's jobs, newest first, with `next_url`/`prev_url` links that
/// point back at this same path.
pub async fn list_jobs(
    auth: AuthUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> AppResult<impl IntoResponse> {
    let path = uri.path().to_owned();
    let page = state
        .jobs
        .list(auth.user_id, params.into(), |page, size| {
            format!("{path}?page={page}&size={size}")
        })
        .await?;

    Ok(Json(DataResponse { data: page }))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/status/{id}
pub async fn get_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.jobs.get_status(job_id, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: JobStatusView::from(&job),
    }))
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/download/{id}
///
/// Returns a signed URL valid for the configured TTL; 409 `NOT_READY` until
/// the job has succeeded.
pub async fn get_download(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let handle = state.jobs.get_download(job_id, auth.user_id).await?;
    tracing::debug!(job_id, user_id = auth.user_id, "Download URL signed");
    Ok(Json(DataResponse { data: handle }))
}
