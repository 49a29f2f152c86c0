//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use serde_json::Value;
use taskdeck::auth::{RefreshCookieConfig, SameSite};
use taskdeck::db::Database;
use taskdeck::mail::MemoryMailer;
use taskdeck::otp::OtpSessionStore;
use taskdeck::{ServerConfig, create_app};
use tower::ServiceExt;

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const SESSION_COOKIE: &str = "session_id";

pub struct TestApp {
    pub app: axum::Router,
    pub db: Database,
    pub mailer: Arc<MemoryMailer>,
    pub otp_sessions: Arc<OtpSessionStore>,
}

/// Create a test app with no resend cooldown (most tests re-request OTPs).
pub async fn create_test_app() -> TestApp {
    create_test_app_with(10, 0).await
}

/// Create a test app with explicit OTP validity and resend cooldown.
pub async fn create_test_app_with(otp_minutes: i64, resend_seconds: i64) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mailer = Arc::new(MemoryMailer::new());
    let otp_sessions = Arc::new(OtpSessionStore::new());

    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: b"test-jwt-secret-test-jwt-secret".to_vec(),
        jwt_issuer: "taskdeck-test".to_string(),
        access_minutes: 15,
        refresh_days: 14,
        refresh_cookie: RefreshCookieConfig {
            name: REFRESH_COOKIE.to_string(),
            path: "/auth".to_string(),
            secure: false,
            same_site: SameSite::Lax,
            days: 14,
        },
        otp_minutes,
        resend_seconds,
        otp_sessions: otp_sessions.clone(),
        mailer: mailer.clone(),
        notifier: None,
    };

    TestApp {
        app: create_app(&config),
        db,
        mailer,
        otp_sessions,
    }
}

/// Send a request. `headers` are (name, value) pairs; a JSON body implies
/// the content-type header.
pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

/// Read the response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// All Set-Cookie header values of a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// The value of a named cookie from Set-Cookie headers, if present.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies.iter().find_map(|c| {
        let rest = c.strip_prefix(&prefix)?;
        Some(rest.split(';').next().unwrap_or("").to_string())
    })
}

/// Whether Set-Cookie headers clear the named cookie (empty value, zero age).
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", name)) && c.contains("Max-Age=0"))
}

/// Run the register flow end to end: request the OTP, read the code from
/// the outbox, verify it. Returns the session cookie used.
pub async fn register_user(test: &TestApp, email: &str, password: &str, full_name: &str) -> String {
    let response = send(
        &test.app,
        "POST",
        "/auth/register/request-otp",
        &[],
        Some(serde_json::json!({
            "email": email,
            "password": password,
            "fullName": full_name,
        })),
    )
    .await;
    assert_eq!(response.status(), 200, "register request-otp failed");

    let cookies = set_cookies(&response);
    let sid = cookie_value(&cookies, SESSION_COOKIE).expect("session cookie not set");
    let session_cookie = format!("{}={}", SESSION_COOKIE, sid);

    let code = test.mailer.last().expect("no OTP sent").code;
    let response = send(
        &test.app,
        "POST",
        "/auth/register/verify-otp",
        &[("cookie", session_cookie.as_str())],
        Some(serde_json::json!({ "otp": code })),
    )
    .await;
    assert_eq!(response.status(), 200, "register verify-otp failed");

    session_cookie
}

/// Login via the API. Returns (access token, raw refresh cookie value).
pub async fn login_user(test: &TestApp, email: &str, password: &str) -> (String, String) {
    let response = send(
        &test.app,
        "POST",
        "/auth/login",
        &[],
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(response.status(), 200, "login failed");

    let cookies = set_cookies(&response);
    let refresh = cookie_value(&cookies, REFRESH_COOKIE).expect("refresh cookie not set");

    let json = body_json(response).await;
    let access = json["accessToken"].as_str().expect("no access token").to_string();
    (access, refresh)
}
