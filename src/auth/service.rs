//! Auth orchestrator: the state machine behind every public auth flow.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use super::error::AuthError;
use crate::db::{Database, DeviceMeta, RefreshToken, User, UserRole};
use crate::jwt::JwtConfig;
use crate::mail::{Mailer, OtpPurpose};
use crate::notify::Notifier;
use crate::otp::{ForgotGate, OtpFailure, OtpSessionStore, RegisterDraft};
use crate::password::{hash_password, verify_password};
use crate::token::{SecretSource, sha256_hex};

/// Tunables for the auth flows.
#[derive(Clone)]
pub struct AuthConfig {
    /// Refresh token lifetime in days.
    pub refresh_days: i64,
    /// OTP validity window in minutes.
    pub otp_minutes: i64,
    /// Minimum seconds between OTP sends for the same flow and session.
    pub resend_seconds: i64,
}

/// Successful login: one access token, one fresh refresh chain link.
pub struct LoginOutcome {
    pub access_token: String,
    pub raw_refresh_token: String,
    pub user: User,
}

/// Successful rotation: new access token and the successor raw secret.
pub struct RefreshOutcome {
    pub access_token: String,
    pub raw_refresh_token: String,
}

pub struct AuthService {
    db: Database,
    jwt: Arc<JwtConfig>,
    otp_sessions: Arc<OtpSessionStore>,
    mailer: Arc<dyn Mailer>,
    notifier: Option<Arc<dyn Notifier>>,
    secrets: SecretSource,
    config: AuthConfig,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

impl AuthService {
    pub fn new(
        db: Database,
        jwt: Arc<JwtConfig>,
        otp_sessions: Arc<OtpSessionStore>,
        mailer: Arc<dyn Mailer>,
        notifier: Option<Arc<dyn Notifier>>,
        config: AuthConfig,
    ) -> Self {
        Self {
            db,
            jwt,
            otp_sessions,
            mailer,
            notifier,
            secrets: SecretSource::new(),
            config,
        }
    }

    // =========================
    // Register (session-scoped OTP)
    // =========================

    /// Start registration: stash a draft in the session and email an OTP.
    pub async fn register_request_otp(
        &self,
        session_id: &str,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let now = now_unix();

        if self.db.users().exists_by_email(&email).await? {
            return Err(AuthError::EmailAlreadyExists);
        }

        self.check_cooldown(self.otp_sessions.register_last_sent(session_id, now as u64), now)?;

        let draft = RegisterDraft {
            email: email.clone(),
            password_hash: hash_password(password)?,
            full_name: full_name.trim().to_string(),
        };

        let code = self.secrets.otp_code();
        let expires_at = now + self.config.otp_minutes * 60;
        self.otp_sessions.start_register(
            session_id,
            draft,
            sha256_hex(&code),
            expires_at as u64,
            now as u64,
        );

        // OTP delivery failure must surface: the user has no other way to
        // obtain the code.
        self.mailer
            .send_otp(&email, &code, OtpPurpose::Register, self.config.otp_minutes as u64)
            .await?;

        info!(email = %email, "Registration OTP sent");
        Ok(())
    }

    /// Complete registration: verify the OTP, create the user, clear state.
    pub async fn register_verify_otp(
        &self,
        session_id: &str,
        code: &str,
    ) -> Result<User, AuthError> {
        let now = now_unix();

        if !self.otp_sessions.has_register_draft(session_id, now as u64) {
            return Err(AuthError::RegisterDraftMissing);
        }

        let draft = self
            .otp_sessions
            .consume_register(session_id, &sha256_hex(code), now as u64)
            .map_err(otp_failure_to_error)?;

        // Public registration always yields the non-privileged role.
        let user_id = self
            .db
            .users()
            .create(
                &draft.email,
                &draft.password_hash,
                &draft.full_name,
                UserRole::Customer,
                true,
                true,
                now,
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AuthError::EmailAlreadyExists
                } else {
                    AuthError::Database(e)
                }
            })?;

        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        info!(user_id, email = %user.email, "User registered");

        // Best-effort side channel; never fails the registration.
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier
                .notify(user_id, None, "WELCOME", "Welcome to Taskdeck", None)
                .await
            {
                warn!(user_id, error = %e, "Welcome notification failed");
            }
        }

        Ok(user)
    }

    // =========================
    // Forgot password (session-scoped OTP)
    // =========================

    /// Start a password reset: email an OTP to an existing active account.
    pub async fn forgot_request_otp(&self, session_id: &str, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let now = now_unix();

        let user = self
            .db
            .users()
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::UserDisabled);
        }

        self.check_cooldown(self.otp_sessions.forgot_last_sent(session_id, now as u64), now)?;

        let code = self.secrets.otp_code();
        let expires_at = now + self.config.otp_minutes * 60;
        self.otp_sessions.start_forgot(
            session_id,
            email.clone(),
            sha256_hex(&code),
            expires_at as u64,
            now as u64,
        );

        self.mailer
            .send_otp(
                &email,
                &code,
                OtpPurpose::ForgotPassword,
                self.config.otp_minutes as u64,
            )
            .await?;

        info!(email = %email, "Password reset OTP sent");
        Ok(())
    }

    /// Verify the reset OTP. Flips the session's verified gate; the password
    /// itself is untouched until `forgot_reset_password`.
    pub async fn forgot_verify_otp(&self, session_id: &str, code: &str) -> Result<(), AuthError> {
        let now = now_unix();
        self.otp_sessions
            .verify_forgot(session_id, &sha256_hex(code), now as u64)
            .map_err(otp_failure_to_error)
    }

    /// Complete the reset: store the new password and log the user out
    /// everywhere.
    pub async fn forgot_reset_password(
        &self,
        session_id: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        let now = now_unix();

        let email = match self.otp_sessions.forgot_gate(session_id, now as u64) {
            ForgotGate::EmailMissing => return Err(AuthError::ForgotEmailMissing),
            ForgotGate::NotVerified => return Err(AuthError::ForgotNotVerified),
            ForgotGate::Verified(email) => email,
        };

        if new_password != confirm_password {
            return Err(AuthError::PasswordConfirmMismatch);
        }

        let user = self
            .db
            .users()
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let hash = hash_password(new_password)?;
        self.db.users().update_password(user.id, &hash, now).await?;

        // Logout all devices.
        let revoked = self
            .db
            .refresh_tokens()
            .revoke_all_for_user(user.id, now)
            .await?;
        info!(user_id = user.id, revoked, "Password reset, sessions revoked");

        self.otp_sessions.clear_forgot(session_id, now as u64);
        Ok(())
    }

    // =========================
    // Change password (authenticated)
    // =========================

    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        let now = now_unix();

        if new_password != confirm_password {
            return Err(AuthError::PasswordConfirmMismatch);
        }

        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::UserDisabled);
        }

        if !verify_password(current_password, &user.password_hash) {
            return Err(AuthError::CurrentPasswordInvalid);
        }

        let hash = hash_password(new_password)?;
        self.db.users().update_password(user_id, &hash, now).await?;

        // Force re-login everywhere else.
        let revoked = self
            .db
            .refresh_tokens()
            .revoke_all_for_user(user_id, now)
            .await?;
        info!(user_id, revoked, "Password changed, sessions revoked");
        Ok(())
    }

    // =========================
    // Login / refresh / logout
    // =========================

    /// Verify credentials and open a session.
    ///
    /// Unknown email and wrong password both yield `InvalidCredentials`, so
    /// the endpoint cannot be used for account enumeration.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: &DeviceMeta,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);

        let user = self
            .db
            .users()
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::UserDisabled);
        }
        if !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let access = self
            .jwt
            .generate_access_token(user.id, user.role)
            .map_err(AuthError::Jwt)?;
        let raw_refresh = self.issue_refresh_token(user.id, meta).await?;

        info!(user_id = user.id, "Login succeeded");
        Ok(LoginOutcome {
            access_token: access.token,
            raw_refresh_token: raw_refresh,
            user,
        })
    }

    /// Rotate a refresh token: retire the presented chain link, mint its
    /// successor, and return a fresh access token.
    ///
    /// Presenting a link that was already rotated means the secret was used
    /// twice: someone holds a stolen copy. Every session for that user is
    /// torn down before the error surfaces.
    pub async fn refresh(
        &self,
        raw_refresh_token: &str,
        meta: &DeviceMeta,
    ) -> Result<RefreshOutcome, AuthError> {
        if raw_refresh_token.trim().is_empty() {
            return Err(AuthError::RefreshTokenMissing);
        }

        let now = now_unix();
        let hash = sha256_hex(raw_refresh_token);
        let current = self
            .db
            .refresh_tokens()
            .get_by_hash(&hash)
            .await?
            .ok_or(AuthError::RefreshTokenInvalid)?;

        if current.is_rotated() {
            return self.reuse_teardown(&current).await;
        }
        if current.revoked_at.is_some() {
            return Err(AuthError::RefreshTokenRevoked);
        }
        if current.expires_at <= now {
            return Err(AuthError::RefreshTokenExpired);
        }

        let user = self
            .db
            .users()
            .get_by_id(current.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::UserDisabled);
        }

        // Rotate atomically: retire the current link and insert its linked
        // successor in one transaction. A crash in between must never leave
        // a revoked link without a successor pointer.
        let raw_next = self.secrets.opaque_secret();
        let next = RefreshToken::new(
            user.id,
            sha256_hex(&raw_next),
            now,
            now + self.config.refresh_days * 24 * 60 * 60,
            meta,
        );

        let mut tx = self.db.begin().await?;
        let claimed = self
            .db
            .refresh_tokens()
            .mark_rotated(&mut tx, &current.id, now)
            .await?;
        if !claimed {
            // A concurrent rotation of the same secret won the race; this
            // request is indistinguishable from replay of a rotated token.
            drop(tx);
            return self.reuse_teardown(&current).await;
        }
        self.db.refresh_tokens().insert_tx(&mut tx, &next).await?;
        self.db
            .refresh_tokens()
            .link_successor(&mut tx, &current.id, &next.id)
            .await?;
        tx.commit().await?;

        let access = self
            .jwt
            .generate_access_token(user.id, user.role)
            .map_err(AuthError::Jwt)?;

        Ok(RefreshOutcome {
            access_token: access.token,
            raw_refresh_token: raw_next,
        })
    }

    /// Revoke the presented refresh token. Blank or unknown tokens are a
    /// silent no-op, as is revoking an already-revoked token.
    pub async fn logout(&self, raw_refresh_token: &str) -> Result<(), AuthError> {
        if raw_refresh_token.trim().is_empty() {
            return Ok(());
        }

        let now = now_unix();
        let hash = sha256_hex(raw_refresh_token);
        if let Some(token) = self.db.refresh_tokens().get_by_hash(&hash).await? {
            if token.revoked_at.is_none() {
                self.db.refresh_tokens().revoke(&token.id, now).await?;
                info!(user_id = token.user_id, "Logout");
            }
        }
        Ok(())
    }

    /// Revoke every active refresh token the user holds.
    pub async fn logout_all(&self, user_id: i64) -> Result<u64, AuthError> {
        let revoked = self
            .db
            .refresh_tokens()
            .revoke_all_for_user(user_id, now_unix())
            .await?;
        info!(user_id, revoked, "Logout everywhere");
        Ok(revoked)
    }

    // =========================
    // Helpers
    // =========================

    async fn issue_refresh_token(
        &self,
        user_id: i64,
        meta: &DeviceMeta,
    ) -> Result<String, AuthError> {
        let now = now_unix();
        let raw = self.secrets.opaque_secret();
        let token = RefreshToken::new(
            user_id,
            sha256_hex(&raw),
            now,
            now + self.config.refresh_days * 24 * 60 * 60,
            meta,
        );
        self.db.refresh_tokens().insert(&token).await?;
        Ok(raw)
    }

    async fn reuse_teardown(&self, token: &RefreshToken) -> Result<RefreshOutcome, AuthError> {
        let revoked = self
            .db
            .refresh_tokens()
            .revoke_all_for_user(token.user_id, now_unix())
            .await?;
        warn!(
            user_id = token.user_id,
            token_id = %token.id,
            revoked,
            "Refresh token reuse detected, all sessions revoked"
        );
        Err(AuthError::RefreshTokenReused)
    }

    fn check_cooldown(&self, last_sent: Option<u64>, now: i64) -> Result<(), AuthError> {
        if let Some(last) = last_sent {
            if now - (last as i64) < self.config.resend_seconds {
                return Err(AuthError::OtpResendTooFast);
            }
        }
        Ok(())
    }

    /// The OTP session store backing this service.
    pub fn otp_sessions(&self) -> &Arc<OtpSessionStore> {
        &self.otp_sessions
    }
}

fn otp_failure_to_error(f: OtpFailure) -> AuthError {
    match f {
        OtpFailure::Missing => AuthError::OtpMissing,
        OtpFailure::Expired => AuthError::OtpExpired,
        OtpFailure::Invalid => AuthError::OtpInvalid,
    }
}
