//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::{error, info};

use crate::auth::SameSite;
use crate::db::{Database, UserRole};
use crate::mail::{LogMailer, Mailer, SmtpMailer};
use crate::password::hash_password;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "Taskdeck", about = "Task management backend with OTP-gated auth")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "taskdeck.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Issuer claim embedded in access tokens
    #[arg(long, env = "JWT_ISSUER", default_value = "taskdeck")]
    pub jwt_issuer: String,

    /// Access token lifetime in minutes
    #[arg(long, env = "ACCESS_MINUTES", default_value = "15")]
    pub access_minutes: u64,

    /// Refresh token lifetime in days
    #[arg(long, env = "REFRESH_DAYS", default_value = "14")]
    pub refresh_days: i64,

    /// Name of the refresh token cookie
    #[arg(long, default_value = "refresh_token")]
    pub refresh_cookie_name: String,

    /// Path scope of the refresh token cookie
    #[arg(long, default_value = "/auth")]
    pub refresh_cookie_path: String,

    /// Set the Secure flag on cookies (requires HTTPS)
    #[arg(long, env = "SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// SameSite attribute of the refresh token cookie
    #[arg(long, value_enum, default_value = "lax")]
    pub same_site: SameSite,

    /// OTP validity window in minutes
    #[arg(long, env = "OTP_MINUTES", default_value = "10")]
    pub otp_minutes: i64,

    /// Minimum seconds between OTP sends for the same flow and session
    #[arg(long, env = "OTP_RESEND_SECONDS", default_value = "30")]
    pub resend_seconds: i64,

    /// Bootstrap admin email (seeded on first run only)
    #[arg(long, env = "BOOTSTRAP_ADMIN_EMAIL", default_value = "admin@local.test")]
    pub bootstrap_admin_email: String,

    /// Bootstrap admin password
    #[arg(
        long,
        env = "BOOTSTRAP_ADMIN_PASSWORD",
        default_value = "Admin@123456",
        hide_default_value = true
    )]
    pub bootstrap_admin_password: String,

    /// Bootstrap admin display name
    #[arg(long, env = "BOOTSTRAP_ADMIN_NAME", default_value = "System Admin")]
    pub bootstrap_admin_name: String,

    /// SMTP host for OTP delivery. When unset, OTP codes are logged instead
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    /// SMTP port
    #[arg(long, env = "SMTP_PORT", default_value = "587")]
    pub smtp_port: u16,

    /// SMTP username
    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,

    /// SMTP password
    #[arg(long, env = "SMTP_PASSWORD")]
    pub smtp_password: Option<String>,

    /// From address for OTP mail
    #[arg(long, env = "SMTP_FROM", default_value = "noreply@taskdeck.local")]
    pub smtp_from: String,

    /// Log output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Seed the bootstrap admin account. First run only: if any user exists the
/// seeding is skipped entirely.
pub async fn bootstrap_admin(db: &Database, email: &str, password: &str, full_name: &str) -> bool {
    let count = match db.users().count().await {
        Ok(count) => count,
        Err(e) => {
            error!(error = %e, "Failed to check for existing users");
            return false;
        }
    };
    if count > 0 {
        return false;
    }

    let email = email.trim().to_lowercase();
    let hash = match hash_password(password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Failed to hash bootstrap admin password");
            return false;
        }
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    match db
        .users()
        .create(&email, &hash, full_name, UserRole::Admin, true, true, now)
        .await
    {
        Ok(_) => {
            info!(email = %email, "Bootstrap admin created");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to create bootstrap admin");
            false
        }
    }
}

/// Build the OTP mailer from SMTP arguments. Without an SMTP host the
/// log-only mailer is used; fine for development, useless in production.
pub fn build_mailer(args: &Args) -> Arc<dyn Mailer> {
    match &args.smtp_host {
        Some(host) => match SmtpMailer::new(
            host,
            args.smtp_port,
            args.smtp_username.clone(),
            args.smtp_password.clone(),
            args.smtp_from.clone(),
        ) {
            Ok(mailer) => Arc::new(mailer),
            Err(e) => {
                error!(error = %e, "Invalid SMTP configuration, falling back to log mailer");
                Arc::new(LogMailer)
            }
        },
        None => {
            info!("SMTP not configured, OTP codes will be logged");
            Arc::new(LogMailer)
        }
    }
}
