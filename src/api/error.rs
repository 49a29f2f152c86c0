//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;

/// API error type with automatic response conversion.
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let code = e.code().to_string();
        match &e {
            AuthError::InvalidCredentials
            | AuthError::RefreshTokenMissing
            | AuthError::RefreshTokenInvalid
            | AuthError::RefreshTokenExpired
            | AuthError::RefreshTokenRevoked
            | AuthError::RefreshTokenReused
            | AuthError::TokenInvalid
            | AuthError::Unauthorized => Self::Unauthorized(code),

            AuthError::UserDisabled | AuthError::EmailNotVerified | AuthError::Forbidden => {
                Self::Forbidden(code)
            }

            AuthError::UserNotFound => Self::NotFound(code),

            AuthError::EmailAlreadyExists => Self::Conflict(code),

            AuthError::OtpResendTooFast => Self::TooManyRequests(code),

            AuthError::OtpMissing
            | AuthError::OtpExpired
            | AuthError::OtpInvalid
            | AuthError::RegisterDraftMissing
            | AuthError::ForgotEmailMissing
            | AuthError::ForgotNotVerified
            | AuthError::PasswordConfirmMismatch
            | AuthError::CurrentPasswordInvalid => Self::BadRequest(code),

            AuthError::Database(_)
            | AuthError::PasswordHash(_)
            | AuthError::Jwt(_)
            | AuthError::Mail(_) => {
                error!("Auth flow failed: {}", e);
                Self::Internal(code)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
