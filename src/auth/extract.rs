//! Authenticated-request extractor for protected endpoints.
//!
//! Reads `Authorization: Bearer <access token>`, validates the signature,
//! issuer, and expiry, and loads the user. Malformed or garbage tokens fail
//! closed: they are treated as absent authentication, never as a pipeline
//! error.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::db::{Database, User};
use crate::jwt::{AccessClaims, JwtConfig};

/// Trait for state types that support bearer authentication.
pub trait HasAuthState {
    fn jwt(&self) -> &JwtConfig;
    fn db(&self) -> &Database;
}

/// The authenticated caller: verified claims plus the loaded user record.
pub struct AuthUser {
    pub user: User,
    pub claims: AccessClaims,
}

/// Rejection for failed bearer authentication.
#[derive(Debug)]
pub enum AuthRejection {
    /// Missing, malformed, expired, or otherwise unusable token
    Unauthorized,
    /// Valid token but the account is disabled
    Forbidden,
    /// Storage failure while loading the user
    Internal,
}

impl AuthRejection {
    fn code(&self) -> &'static str {
        match self {
            AuthRejection::Unauthorized => "UNAUTHORIZED",
            AuthRejection::Forbidden => "FORBIDDEN",
            AuthRejection::Internal => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthRejection::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthRejection::Forbidden => StatusCode::FORBIDDEN,
            AuthRejection::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (self.status(), Json(ErrorResponse { error: self.code() })).into_response()
    }
}

/// Extract the bearer token from the Authorization header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthRejection::Unauthorized)?;

        let claims = state
            .jwt()
            .validate_access_token(token)
            .map_err(|_| AuthRejection::Unauthorized)?;

        let user_id = claims.user_id().map_err(|_| AuthRejection::Unauthorized)?;

        let user = state
            .db()
            .users()
            .get_by_id(user_id)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load user: {}", e);
                AuthRejection::Internal
            })?
            .ok_or(AuthRejection::Unauthorized)?;

        if !user.is_active {
            return Err(AuthRejection::Forbidden);
        }

        Ok(AuthUser { user, claims })
    }
}
