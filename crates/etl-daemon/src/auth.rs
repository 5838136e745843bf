//! Axum extractors for the JWT/HTTP boundary (§6). Token *issuance* and
//! *verification mechanics* are an external collaborator's job — `AppState`
//! only holds an `Arc<dyn JwtValidator>` (etl-types) and calls through it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use etl_types::Identity;
use std::sync::Arc;

use crate::api_types::ErrorResponse;
use crate::state::AppState;

/// Any caller with a token that validates. Handlers that only need to know
/// *who* is calling (not *what role*) extract this directly.
pub struct AuthenticatedUser(pub Identity);

/// A caller whose identity carries the `ADMIN` role — every write-ish §6
/// endpoint requires this instead of `AuthenticatedUser`.
pub struct AdminUser(pub Identity);

#[derive(Debug)]
pub struct AuthError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

fn extract_bearer(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError {
            status: StatusCode::UNAUTHORIZED,
            message: "AUTH: missing Authorization header".to_string(),
        })?;

    header.strip_prefix("Bearer ").ok_or_else(|| AuthError {
        status: StatusCode::UNAUTHORIZED,
        message: "AUTH: Authorization header must be a Bearer token".to_string(),
    })
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(parts)?;
        let identity = state.jwt_validator.validate(token).map_err(|e| AuthError {
            status: StatusCode::UNAUTHORIZED,
            message: format!("AUTH: {e}"),
        })?;
        Ok(AuthenticatedUser(identity))
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(identity) = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            return Err(AuthError {
                status: StatusCode::FORBIDDEN,
                message: format!("AUTH: {} lacks the ADMIN role", identity.username),
            });
        }
        Ok(AdminUser(identity))
    }
}
