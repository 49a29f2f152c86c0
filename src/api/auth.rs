//! Auth API endpoints.
//!
//! - POST `/register/request-otp` - Start registration, email an OTP
//! - POST `/register/verify-otp` - Verify the OTP and create the account
//! - POST `/forgot/request-otp` - Start a password reset, email an OTP
//! - POST `/forgot/verify-otp` - Verify the reset OTP
//! - POST `/forgot/reset-password` - Set a new password after verification
//! - PATCH `/change-password` - Change password (authenticated)
//! - POST `/login` - Verify credentials, issue access + refresh tokens
//! - POST `/refresh` - Rotate the refresh token, mint a new access token
//! - POST `/logout` - Revoke the presented refresh token
//! - POST `/logout-all` - Revoke every session (authenticated)

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE, request::Parts},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{patch, post},
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::auth::{
    AuthService, AuthUser, HasAuthState, RefreshCookieConfig, SESSION_COOKIE_NAME, get_cookie,
};
use crate::db::{Database, DeviceMeta, User};
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_otp_request};

#[derive(Clone)]
pub struct AuthApiState {
    pub auth: Arc<AuthService>,
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub refresh_cookie: RefreshCookieConfig,
    pub rate_limits: Arc<RateLimitConfig>,
}

impl HasAuthState for AuthApiState {
    fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    fn db(&self) -> &Database {
        &self.db
    }
}

pub fn router(state: AuthApiState) -> Router {
    let otp_routes = Router::new()
        .route("/register/request-otp", post(register_request_otp))
        .route("/forgot/request-otp", post(forgot_request_otp))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limits.clone(),
            rate_limit_otp_request,
        ));

    let login_routes = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limits.clone(),
            rate_limit_login,
        ));

    let other_routes = Router::new()
        .route("/register/verify-otp", post(register_verify_otp))
        .route("/forgot/verify-otp", post(forgot_verify_otp))
        .route("/forgot/reset-password", post(forgot_reset_password))
        .route("/change-password", patch(change_password))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .with_state(state);

    Router::new()
        .merge(otp_routes)
        .merge(login_routes)
        .merge(other_routes)
}

// =========================
// Request/response bodies
// =========================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    email: String,
    password: String,
    full_name: String,
}

#[derive(Deserialize)]
struct VerifyOtpRequest {
    otp: String,
}

#[derive(Deserialize)]
struct ForgotRequest {
    email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest {
    new_password: String,
    confirm_new_password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
    confirm_new_password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    id: i64,
    email: String,
    full_name: String,
    role: crate::db::UserRole,
    email_verified: bool,
    is_active: bool,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            full_name: u.full_name,
            role: u.role,
            email_verified: u.email_verified,
            is_active: u.is_active,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    user: UserResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

// =========================
// Input validation
// =========================

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() || email.len() > 254 || !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 || password.len() > 64 {
        return Err(ApiError::bad_request("Password must be 8-64 characters"));
    }
    Ok(())
}

fn validate_full_name(full_name: &str) -> Result<(), ApiError> {
    let name = full_name.trim();
    if name.is_empty() || name.len() > 120 {
        return Err(ApiError::bad_request("Full name must be 1-120 characters"));
    }
    Ok(())
}

fn validate_otp(otp: &str) -> Result<(), ApiError> {
    if otp.len() != 6 || !otp.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request("OTP must be 6 digits"));
    }
    Ok(())
}

// =========================
// Request metadata
// =========================

/// Client metadata recorded on refresh token chain links.
struct ClientMeta(DeviceMeta);

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = extract_client_ip(parts);
        let user_agent = header_string(&parts.headers, "user-agent");
        let device_name = header_string(&parts.headers, "x-device-name");
        Ok(ClientMeta(DeviceMeta {
            ip,
            user_agent,
            device_name,
        }))
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract client IP: X-Forwarded-For first (reverse proxy), then the
/// connection's socket address.
fn extract_client_ip(parts: &Parts) -> Option<String> {
    if let Some(forwarded_for) = parts.headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            if let Some(first_ip) = value.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// The browser session id scoping OTP state: reuse the cookie when present,
/// otherwise mint a new id and return the Set-Cookie value to attach.
fn session_id(headers: &HeaderMap) -> (String, Option<String>) {
    if let Some(sid) = get_cookie(headers, SESSION_COOKIE_NAME) {
        if !sid.is_empty() {
            return (sid.to_string(), None);
        }
    }
    let sid = uuid::Uuid::new_v4().to_string();
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/",
        SESSION_COOKIE_NAME, sid
    );
    (sid, Some(cookie))
}

/// Set-Cookie headers for a response: the optional session cookie plus any
/// refresh cookie value.
fn cookie_headers(
    session_cookie: Option<String>,
    refresh_cookie: Option<String>,
) -> AppendHeaders<Vec<(axum::http::HeaderName, String)>> {
    let mut headers = Vec::new();
    if let Some(cookie) = session_cookie {
        headers.push((SET_COOKIE, cookie));
    }
    if let Some(cookie) = refresh_cookie {
        headers.push((SET_COOKIE, cookie));
    }
    AppendHeaders(headers)
}

// =========================
// Register
// =========================

async fn register_request_otp(
    State(state): State<AuthApiState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_email(&payload.email)?;
    validate_password(&payload.password)?;
    validate_full_name(&payload.full_name)?;

    let (sid, session_cookie) = session_id(&headers);
    state
        .auth
        .register_request_otp(&sid, &payload.email, &payload.password, &payload.full_name)
        .await?;

    Ok((
        StatusCode::OK,
        cookie_headers(session_cookie, None),
        Json(MessageResponse { message: "OTP_SENT" }),
    ))
}

async fn register_verify_otp(
    State(state): State<AuthApiState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_otp(&payload.otp)?;

    let (sid, session_cookie) = session_id(&headers);
    state.auth.register_verify_otp(&sid, &payload.otp).await?;

    Ok((
        StatusCode::OK,
        cookie_headers(session_cookie, None),
        Json(MessageResponse {
            message: "REGISTERED_SUCCESS",
        }),
    ))
}

// =========================
// Forgot password
// =========================

async fn forgot_request_otp(
    State(state): State<AuthApiState>,
    headers: HeaderMap,
    Json(payload): Json<ForgotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_email(&payload.email)?;

    let (sid, session_cookie) = session_id(&headers);
    state.auth.forgot_request_otp(&sid, &payload.email).await?;

    Ok((
        StatusCode::OK,
        cookie_headers(session_cookie, None),
        Json(MessageResponse { message: "OTP_SENT" }),
    ))
}

async fn forgot_verify_otp(
    State(state): State<AuthApiState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_otp(&payload.otp)?;

    let (sid, session_cookie) = session_id(&headers);
    state.auth.forgot_verify_otp(&sid, &payload.otp).await?;

    Ok((
        StatusCode::OK,
        cookie_headers(session_cookie, None),
        Json(MessageResponse {
            message: "OTP_VERIFIED",
        }),
    ))
}

async fn forgot_reset_password(
    State(state): State<AuthApiState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_password(&payload.new_password)?;
    validate_password(&payload.confirm_new_password)?;

    let (sid, session_cookie) = session_id(&headers);
    state
        .auth
        .forgot_reset_password(&sid, &payload.new_password, &payload.confirm_new_password)
        .await?;

    Ok((
        StatusCode::OK,
        cookie_headers(session_cookie, None),
        Json(MessageResponse {
            message: "PASSWORD_RESET_SUCCESS",
        }),
    ))
}

// =========================
// Change password (authenticated)
// =========================

async fn change_password(
    State(state): State<AuthApiState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_password(&payload.new_password)?;
    validate_password(&payload.confirm_new_password)?;

    state
        .auth
        .change_password(
            auth.user.id,
            &payload.current_password,
            &payload.new_password,
            &payload.confirm_new_password,
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "PASSWORD_CHANGED",
        }),
    ))
}

// =========================
// Login / refresh / logout
// =========================

async fn login(
    State(state): State<AuthApiState>,
    ClientMeta(meta): ClientMeta,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_email(&payload.email)?;
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password cannot be empty"));
    }

    let outcome = state.auth.login(&payload.email, &payload.password, &meta).await?;
    let refresh_cookie = state.refresh_cookie.build(&outcome.raw_refresh_token);

    Ok((
        StatusCode::OK,
        cookie_headers(None, Some(refresh_cookie)),
        Json(LoginResponse {
            access_token: outcome.access_token,
            user: outcome.user.into(),
        }),
    ))
}

async fn refresh(
    State(state): State<AuthApiState>,
    ClientMeta(meta): ClientMeta,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let raw = get_cookie(&headers, &state.refresh_cookie.name).unwrap_or("");

    let outcome = state.auth.refresh(raw, &meta).await?;
    let refresh_cookie = state.refresh_cookie.build(&outcome.raw_refresh_token);

    Ok((
        StatusCode::OK,
        cookie_headers(None, Some(refresh_cookie)),
        Json(RefreshResponse {
            access_token: outcome.access_token,
        }),
    ))
}

async fn logout(
    State(state): State<AuthApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let raw = get_cookie(&headers, &state.refresh_cookie.name).unwrap_or("");
    state.auth.logout(raw).await?;

    Ok((
        StatusCode::OK,
        cookie_headers(None, Some(state.refresh_cookie.clear())),
        Json(MessageResponse {
            message: "LOGGED_OUT",
        }),
    ))
}

async fn logout_all(
    State(state): State<AuthApiState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.logout_all(auth.user.id).await?;

    Ok((
        StatusCode::OK,
        cookie_headers(None, Some(state.refresh_cookie.clear())),
        Json(MessageResponse {
            message: "LOGGED_OUT",
        }),
    ))
}
