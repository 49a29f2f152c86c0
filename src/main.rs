use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use taskdeck::auth::RefreshCookieConfig;
use taskdeck::cli::{Args, bootstrap_admin, build_mailer, init_logging, load_jwt_secret, open_database};
use taskdeck::otp::OtpSessionStore;
use taskdeck::{ServerConfig, create_app, init_cleanup};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    bootstrap_admin(
        &db,
        &args.bootstrap_admin_email,
        &args.bootstrap_admin_password,
        &args.bootstrap_admin_name,
    )
    .await;

    let otp_sessions = Arc::new(OtpSessionStore::new());
    init_cleanup(&db, otp_sessions.clone()).await;

    let config = ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        jwt_issuer: args.jwt_issuer.clone(),
        access_minutes: args.access_minutes,
        refresh_days: args.refresh_days,
        refresh_cookie: RefreshCookieConfig {
            name: args.refresh_cookie_name.clone(),
            path: args.refresh_cookie_path.clone(),
            secure: args.secure_cookies,
            same_site: args.same_site,
            days: args.refresh_days,
        },
        otp_minutes: args.otp_minutes,
        resend_seconds: args.resend_seconds,
        otp_sessions,
        mailer: build_mailer(&args),
        notifier: None,
    };
    let app = create_app(&config);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap();
    info!(address = %local_addr, "Listening");

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
