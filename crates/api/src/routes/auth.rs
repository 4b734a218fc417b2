use axum::routing::post;
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/auth`. None of them require a token.
///
/// ```text
/// POST   /register        -> register
/// POST   /signin          -> signin
/// POST   /signin/form     -> signin_form
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/signin", post(auth::signin))
        .route("/signin/form", post(auth::signin_form))
}
