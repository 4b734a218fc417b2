pub mod auth;
pub mod formats;
pub mod health;
pub mod jobs;
pub mod users;

use axum::routing::get;
use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/register                create an account
/// /auth/signin                  email + password -> access token (JSON)
/// /auth/signin/form             same, OAuth2 password form
///
/// /users/me                     own profile
///
/// /ws/jobs/{id}                 live status for one job (WebSocket)
///
/// /jobs                         list own jobs (paginated)
/// /jobs/convert                 submit a conversion (multipart)
/// /jobs/status/{id}             job status
/// /jobs/download/{id}           signed download URL
///
/// /formats/image                supported image formats
/// ```
///
/// Every route outside `/auth` requires a Bearer token (`?token=` for the
/// WebSocket).
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .route("/ws/jobs/{id}", get(ws::job_ws_handler))
        .nest("/jobs", jobs::router(config.max_upload_bytes))
        .nest("/formats", formats::router())
}
