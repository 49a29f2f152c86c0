//! Best-effort notification side channel.
//!
//! Task CRUD, realtime fan-out, and web push live outside this crate; they
//! consume authenticated identities and provide a notification callback. The
//! auth core only holds an optional [`Notifier`] and invokes it in a
//! try/ignore-failure manner: a failed notification must never fail the
//! primary transaction.

use async_trait::async_trait;

/// A notification delivery capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient_id: i64,
        actor_id: Option<i64>,
        kind: &str,
        message: &str,
        subject_id: Option<i64>,
    ) -> Result<(), NotifyError>;
}

/// Error delivering a notification. Callers log and move on.
#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to deliver notification: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}
