//! Handlers for the `/auth` resource (register, sign-in).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Form, Json};
use pixelforge_core::error::CoreError;
use pixelforge_core::types::DbId;
use pixelforge_db::models::user::{NewUser, User, UserResponse};
use serde::{Deserialize, Serialize};

use crate::auth::jwt::generate_access_token;
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

const MIN_PASSWORD_LENGTH: usize = 8;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/signin`.
#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

/// OAuth2 password-grant form for `POST /auth/signin/form`. `username`
/// carries the email; other grant fields are ignored.
#[derive(Debug, Deserialize)]
pub struct SigninForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/register
///
/// Create an account. Returns 201 with the public profile; an email that is
/// already registered is a 400.
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let RegisterRequest {
        username,
        email,
        password,
    } = input;
    let username = username.trim().to_string();
    let email = email.trim().to_string();

    if username.is_empty() {
        return Err(CoreError::Validation("username must not be empty".into()).into());
    }
    if !is_plausible_email(&email) {
        return Err(CoreError::Validation(format!("'{email}' is not a valid email")).into());
    }
    validate_password_strength(&password, MIN_PASSWORD_LENGTH).map_err(CoreError::Validation)?;

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::InternalError(format!("Password hashing task failed: {e}")))?
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    let user = state
        .users
        .create(&NewUser {
            username,
            email,
            password_hash,
        })
        .await?
        .ok_or_else(|| AppError::BadRequest("User with this email is already registered".into()))?;

    tracing::info!(user_id = user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: UserResponse::from(user),
        }),
    ))
}

/// POST /api/v1/auth/signin
///
/// Exchange email + password for an access token.
pub async fn signin(
    State(state): State<AppState>,
    Json(input): Json<SigninRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user = authenticate(&state, &input.email, input.password).await?;
    Ok(Json(issue_token(&state, user.id)?))
}

/// POST /api/v1/auth/signin/form
///
/// Same as [`signin`], for OAuth2 password-flow clients posting a form.
pub async fn signin_form(
    State(state): State<AppState>,
    Form(input): Form<SigninForm>,
) -> AppResult<Json<TokenResponse>> {
    let user = authenticate(&state, &input.username, input.password).await?;
    Ok(Json(issue_token(&state, user.id)?))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn invalid_credentials() -> AppError {
    AppError::Core(CoreError::Unauthorized("Invalid credentials".into()))
}

/// Look the user up by email and check the password. An unknown email and a
/// wrong password are indistinguishable to the caller.
async fn authenticate(state: &AppState, email: &str, password: String) -> AppResult<User> {
    let user = state
        .users
        .find_by_email(email.trim())
        .await?
        .ok_or_else(invalid_credentials)?;

    let hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::InternalError(format!("Password verification task failed: {e}")))?
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;

    if !valid {
        tracing::info!(user_id = user.id, "Sign-in rejected");
        return Err(invalid_credentials());
    }
    Ok(user)
}

fn issue_token(state: &AppState, user_id: DbId) -> AppResult<TokenResponse> {
    let jwt = &state.config.jwt;
    let access_token = generate_access_token(user_id, jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;
    tracing::info!(user_id, "Access token issued");
    Ok(TokenResponse {
        access_token,
        token_type: "bearer",
        expires_in: jwt.access_token_expiry_mins * 60,
    })
}

/// Cheap shape check: one `@` with something on both sides and a dot in the
/// domain.
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check() {
        assert!(is_plausible_email("ada@example.com"));
        assert!(!is_plausible_email("ada.example.com"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ada@localhost"));
        assert!(!is_plausible_email("ada@@example.com"));
        assert!(!is_plausible_email("a da@example.com"));
    }
}
