//! Handlers for the `/users` resource.

use axum::extract::State;
use axum::Json;
use pixelforge_core::error::CoreError;
use pixelforge_db::models::user::UserResponse;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/users/me
///
/// The caller's own profile. A valid token for an account that no longer
/// exists (or never had a row) is a 401.
pub async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    let user = state
        .users
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("User not found".into())))?;
    Ok(Json(DataResponse { data: user.into() }))
}
