//! Scheduled cleanup tasks for expired/abandoned auth state.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{error, info};

use crate::db::Database;
use crate::otp::OtpSessionStore;

/// Grace period between a refresh token expiring and its row being deleted.
/// Within the window a lapsed session still gets the expired error rather
/// than the unknown-token error.
const EXPIRED_TOKEN_GRACE_SECS: i64 = 7 * 24 * 60 * 60;

/// OTP sessions untouched this long are dropped.
const STALE_SESSION_SECS: u64 = 24 * 60 * 60;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, otp_sessions: &OtpSessionStore) {
    let now = now_unix();

    match db
        .refresh_tokens()
        .delete_expired_before(now - EXPIRED_TOKEN_GRACE_SECS)
        .await
    {
        Ok(count) if count > 0 => info!("Cleaned up {} expired refresh tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired refresh tokens: {}", e),
    }

    let purged = otp_sessions.purge_stale((now as u64).saturating_sub(STALE_SESSION_SECS));
    if purged > 0 {
        info!("Cleaned up {} stale OTP sessions", purged);
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    db: Database,
    otp_sessions: Arc<OtpSessionStore>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db, &otp_sessions).await;
        }
    })
}
