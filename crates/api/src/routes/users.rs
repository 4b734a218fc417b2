use axum::routing::get;
use axum::Router;

use crate::handlers::users;
use crate::state::AppState;

/// Routes mounted at `/users`.
///
/// ```text
/// GET    /me              -> get_me
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(users::get_me))
}
