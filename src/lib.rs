pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod mail;
pub mod notify;
pub mod otp;
pub mod password;
pub mod rate_limit;
pub mod token;

use std::net::SocketAddr;
use std::sync::Arc;

use api::create_api_router;
use auth::{AuthConfig, AuthService, RefreshCookieConfig};
use axum::Router;
use db::Database;
use jwt::JwtConfig;
use mail::Mailer;
use notify::Notifier;
use otp::OtpSessionStore;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub jwt_secret: Vec<u8>,
    /// Issuer claim embedded in access tokens
    pub jwt_issuer: String,
    /// Access token lifetime in minutes
    pub access_minutes: u64,
    /// Refresh token lifetime in days
    pub refresh_days: i64,
    /// How the refresh cookie is issued and cleared
    pub refresh_cookie: RefreshCookieConfig,
    /// OTP validity window in minutes
    pub otp_minutes: i64,
    /// Minimum seconds between OTP sends for the same flow and session
    pub resend_seconds: i64,
    /// Session-scoped OTP state, shared with the cleanup scheduler
    pub otp_sessions: Arc<OtpSessionStore>,
    /// OTP delivery
    pub mailer: Arc<dyn Mailer>,
    /// Optional best-effort notification side channel
    pub notifier: Option<Arc<dyn Notifier>>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(
        &config.jwt_secret,
        &config.jwt_issuer,
        config.access_minutes,
    ));

    let auth = Arc::new(AuthService::new(
        config.db.clone(),
        jwt.clone(),
        config.otp_sessions.clone(),
        config.mailer.clone(),
        config.notifier.clone(),
        AuthConfig {
            refresh_days: config.refresh_days,
            otp_minutes: config.otp_minutes,
            resend_seconds: config.resend_seconds,
        },
    ));

    create_api_router(config.db.clone(), auth, jwt, config.refresh_cookie.clone())
}

/// Run cleanup once and spawn the background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database, otp_sessions: Arc<OtpSessionStore>) {
    cleanup::run_cleanup(db, &otp_sessions).await;
    cleanup::spawn_cleanup_scheduler(db.clone(), otp_sessions);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    init_cleanup(&config.db, config.otp_sessions.clone()).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
