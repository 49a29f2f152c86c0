//! Error taxonomy for the auth flows.
//!
//! Every variant surfaces to the caller as a distinct failure signal with a
//! stable machine code; nothing is silently downgraded or retried. The one
//! variant with a side effect is `RefreshTokenReused`, which tears down all
//! of the user's sessions before surfacing.

use crate::jwt::JwtError;
use crate::mail::MailError;
use crate::password::PasswordHashError;

#[derive(Debug)]
pub enum AuthError {
    InvalidCredentials,
    UserNotFound,
    UserDisabled,
    EmailNotVerified,
    EmailAlreadyExists,
    OtpMissing,
    OtpExpired,
    OtpInvalid,
    OtpResendTooFast,
    RegisterDraftMissing,
    ForgotEmailMissing,
    ForgotNotVerified,
    PasswordConfirmMismatch,
    CurrentPasswordInvalid,
    RefreshTokenMissing,
    RefreshTokenInvalid,
    RefreshTokenExpired,
    RefreshTokenRevoked,
    RefreshTokenReused,
    TokenInvalid,
    Forbidden,
    Unauthorized,
    Database(sqlx::Error),
    PasswordHash(PasswordHashError),
    Jwt(JwtError),
    Mail(MailError),
}

impl AuthError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::UserDisabled => "USER_DISABLED",
            AuthError::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            AuthError::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            AuthError::OtpMissing => "OTP_MISSING",
            AuthError::OtpExpired => "OTP_EXPIRED",
            AuthError::OtpInvalid => "OTP_INVALID",
            AuthError::OtpResendTooFast => "OTP_RESEND_TOO_FAST",
            AuthError::RegisterDraftMissing => "REGISTER_DRAFT_MISSING",
            AuthError::ForgotEmailMissing => "FORGOT_EMAIL_MISSING",
            AuthError::ForgotNotVerified => "FORGOT_NOT_VERIFIED",
            AuthError::PasswordConfirmMismatch => "PASSWORD_CONFIRM_NOT_MATCH",
            AuthError::CurrentPasswordInvalid => "CURRENT_PASSWORD_INVALID",
            AuthError::RefreshTokenMissing => "REFRESH_TOKEN_MISSING",
            AuthError::RefreshTokenInvalid => "REFRESH_TOKEN_INVALID",
            AuthError::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            AuthError::RefreshTokenRevoked => "REFRESH_TOKEN_REVOKED",
            AuthError::RefreshTokenReused => "REFRESH_TOKEN_REUSED",
            AuthError::TokenInvalid => "TOKEN_INVALID",
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::Database(_)
            | AuthError::PasswordHash(_)
            | AuthError::Jwt(_)
            | AuthError::Mail(_) => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Database(e) => write!(f, "Database error: {}", e),
            AuthError::PasswordHash(e) => write!(f, "{}", e),
            AuthError::Jwt(e) => write!(f, "{}", e),
            AuthError::Mail(e) => write!(f, "{}", e),
            other => write!(f, "{}", other.code()),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Database(e)
    }
}

impl From<PasswordHashError> for AuthError {
    fn from(e: PasswordHashError) -> Self {
        AuthError::PasswordHash(e)
    }
}

impl From<MailError> for AuthError {
    fn from(e: MailError) -> Self {
        AuthError::Mail(e)
    }
}
