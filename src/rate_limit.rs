//! Rate limiting for authentication endpoints.
//!
//! Token bucket with per-IP tracking. Login gets a generous per-second
//! quota; OTP requests are tighter since each one sends an email.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Per-IP keyed rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login attempts (2/s, burst 10)
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for OTP request endpoints (10/min, burst 10)
    pub otp_request: Arc<IpLimiter>,
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(NonZeroU32::new(2).unwrap())
                    .allow_burst(NonZeroU32::new(10).unwrap()),
            )),
            otp_request: Arc::new(RateLimiter::keyed(
                Quota::per_minute(NonZeroU32::new(10).unwrap())
                    .allow_burst(NonZeroU32::new(10).unwrap()),
            )),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Client IP for rate limit keying: X-Forwarded-For first (reverse proxy),
/// then the socket address; "local" when neither is available (tests).
fn client_ip_key(request: &Request) -> String {
    if let Some(forwarded_for) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            if let Some(first_ip) = value.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "local".to_string())
}

fn too_many_requests(message: &'static str) -> Response {
    (StatusCode::TOO_MANY_REQUESTS, message).into_response()
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip_key(&request);
    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => too_many_requests("Too many login attempts. Please wait before trying again."),
    }
}

/// Middleware for rate limiting OTP request endpoints.
pub async fn rate_limit_otp_request(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip_key(&request);
    match config.otp_request.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => too_many_requests("Too many OTP requests. Please wait before trying again."),
    }
}
