//! Authentication middleware for protected routes.
//!
//! Extracts Bearer token from Authorization header, validates the JWT, and
//! injects the authenticated user into request extensions.

use crate::auth::JwtValidator;
use crate::errors::ClubhouseError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_validator: Arc<JwtValidator>,
}

/// Authentication middleware that validates JWT tokens.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Returns 401 Unauthorized with WWW-Authenticate header if token is missing or invalid
/// - Continues to next handler with `AuthenticatedUser` in extensions if token is valid
#[instrument(skip_all, name = "clubhouse.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ClubhouseError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "clubhouse.middleware.auth", "Missing Authorization header");
            ClubhouseError::InvalidToken("Missing Authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "clubhouse.middleware.auth", "Invalid Authorization header format");
        ClubhouseError::InvalidToken("Invalid Authorization header format".to_string())
    })?;

    let user = state.jwt_validator.validate(token)?;

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
