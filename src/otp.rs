//! Session-scoped OTP state for the registration and forgot-password flows.
//!
//! State lives only in memory, keyed by the browser's `session_id` cookie
//! value. The two flows use disjoint namespaces inside one entry; a hash and
//! expiry pair is consumed exactly once (cleared on successful verification
//! or on observed expiry) and the whole namespace is cleared when its flow
//! completes. Nothing here is ever written to durable storage.

use std::collections::HashMap;
use std::sync::Mutex;

/// Provisional registration data held pending OTP verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDraft {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
}

/// Why an OTP check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpFailure {
    /// No code has been issued (or it was already consumed).
    Missing,
    /// The code was issued but its validity window has passed.
    Expired,
    /// The submitted code does not match.
    Invalid,
}

/// Registration flow state. Fields mirror the session attributes the flow
/// sets one by one; absent fields mean that step has not happened yet.
#[derive(Debug, Default)]
struct RegisterState {
    draft: Option<RegisterDraft>,
    otp_hash: Option<String>,
    otp_expires_at: Option<u64>,
    last_sent_at: Option<u64>,
}

/// Forgot-password flow state.
#[derive(Debug, Default)]
struct ForgotState {
    email: Option<String>,
    otp_hash: Option<String>,
    otp_expires_at: Option<u64>,
    verified: bool,
    last_sent_at: Option<u64>,
}

#[derive(Debug, Default)]
struct OtpSession {
    register: RegisterState,
    forgot: ForgotState,
    touched_at: u64,
}

/// In-memory store of per-session OTP state.
///
/// Entries are isolated per session key; one browser session never observes
/// another's drafts or codes.
pub struct OtpSessionStore {
    sessions: Mutex<HashMap<String, OtpSession>>,
}

impl OtpSessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn with_session<T>(&self, session_id: &str, now: u64, f: impl FnOnce(&mut OtpSession) -> T) -> T {
        let mut sessions = self.sessions.lock().expect("otp session store poisoned");
        let session = sessions.entry(session_id.to_string()).or_default();
        session.touched_at = now;
        f(session)
    }

    /// When the register flow last sent an OTP for this session.
    pub fn register_last_sent(&self, session_id: &str, now: u64) -> Option<u64> {
        self.with_session(session_id, now, |s| s.register.last_sent_at)
    }

    /// When the forgot flow last sent an OTP for this session.
    pub fn forgot_last_sent(&self, session_id: &str, now: u64) -> Option<u64> {
        self.with_session(session_id, now, |s| s.forgot.last_sent_at)
    }

    /// Store a fresh registration draft and OTP challenge, replacing any
    /// previous register state for this session.
    pub fn start_register(
        &self,
        session_id: &str,
        draft: RegisterDraft,
        otp_hash: String,
        expires_at: u64,
        now: u64,
    ) {
        self.with_session(session_id, now, |s| {
            s.register = RegisterState {
                draft: Some(draft),
                otp_hash: Some(otp_hash),
                otp_expires_at: Some(expires_at),
                last_sent_at: Some(now),
            };
        });
    }

    /// Whether a registration draft is present for this session.
    pub fn has_register_draft(&self, session_id: &str, now: u64) -> bool {
        self.with_session(session_id, now, |s| s.register.draft.is_some())
    }

    /// Check the submitted register OTP hash and, on success, consume the
    /// whole register namespace, returning the draft.
    ///
    /// An expired challenge is cleared on observation; a wrong code leaves
    /// the challenge in place so the user may retry within the window.
    pub fn consume_register(
        &self,
        session_id: &str,
        candidate_hash: &str,
        now: u64,
    ) -> Result<RegisterDraft, OtpFailure> {
        self.with_session(session_id, now, |s| {
            let (hash, expires_at) = match (&s.register.otp_hash, s.register.otp_expires_at) {
                (Some(hash), Some(exp)) => (hash.clone(), exp),
                _ => return Err(OtpFailure::Missing),
            };
            if now > expires_at {
                s.register.otp_hash = None;
                s.register.otp_expires_at = None;
                return Err(OtpFailure::Expired);
            }
            if candidate_hash != hash {
                return Err(OtpFailure::Invalid);
            }
            let draft = s.register.draft.take().ok_or(OtpFailure::Missing)?;
            s.register = RegisterState::default();
            Ok(draft)
        })
    }

    /// Clear all register state for this session.
    pub fn clear_register(&self, session_id: &str, now: u64) {
        self.with_session(session_id, now, |s| s.register = RegisterState::default());
    }

    /// Store a fresh forgot-password OTP challenge, replacing any previous
    /// forgot state for this session. Resets the verified gate.
    pub fn start_forgot(
        &self,
        session_id: &str,
        email: String,
        otp_hash: String,
        expires_at: u64,
        now: u64,
    ) {
        self.with_session(session_id, now, |s| {
            s.forgot = ForgotState {
                email: Some(email),
                otp_hash: Some(otp_hash),
                otp_expires_at: Some(expires_at),
                verified: false,
                last_sent_at: Some(now),
            };
        });
    }

    /// Check the submitted forgot OTP hash and, on success, consume the
    /// challenge and flip the verified gate. The target email stays until
    /// the flow completes.
    pub fn verify_forgot(
        &self,
        session_id: &str,
        candidate_hash: &str,
        now: u64,
    ) -> Result<(), OtpFailure> {
        self.with_session(session_id, now, |s| {
            let (hash, expires_at) = match (&s.forgot.otp_hash, s.forgot.otp_expires_at) {
                (Some(hash), Some(exp)) => (hash.clone(), exp),
                _ => return Err(OtpFailure::Missing),
            };
            if now > expires_at {
                s.forgot.otp_hash = None;
                s.forgot.otp_expires_at = None;
                return Err(OtpFailure::Expired);
            }
            if candidate_hash != hash {
                return Err(OtpFailure::Invalid);
            }
            s.forgot.otp_hash = None;
            s.forgot.otp_expires_at = None;
            s.forgot.verified = true;
            Ok(())
        })
    }

    /// Where this session stands in the two-step forgot gate. The email is
    /// released only after verification succeeded earlier in this session.
    pub fn forgot_gate(&self, session_id: &str, now: u64) -> ForgotGate {
        self.with_session(session_id, now, |s| {
            match (&s.forgot.email, s.forgot.verified) {
                (None, _) => ForgotGate::EmailMissing,
                (Some(_), false) => ForgotGate::NotVerified,
                (Some(email), true) => ForgotGate::Verified(email.clone()),
            }
        })
    }

    /// Clear all forgot state for this session.
    pub fn clear_forgot(&self, session_id: &str, now: u64) {
        self.with_session(session_id, now, |s| s.forgot = ForgotState::default());
    }

    /// Drop sessions that have not been touched since `cutoff`.
    /// Returns the number of sessions removed.
    pub fn purge_stale(&self, cutoff: u64) -> usize {
        let mut sessions = self.sessions.lock().expect("otp session store poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| s.touched_at >= cutoff);
        before - sessions.len()
    }
}

impl Default for OtpSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of checking the forgot-password reset gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgotGate {
    /// No forgot flow in progress for this session.
    EmailMissing,
    /// OTP requested but not yet verified.
    NotVerified,
    /// Verified; carries the target email.
    Verified(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::sha256_hex;

    fn draft() -> RegisterDraft {
        RegisterDraft {
            email: "a@x.com".to_string(),
            password_hash: "hash".to_string(),
            full_name: "A".to_string(),
        }
    }

    #[test]
    fn test_register_consume_success_clears_state() {
        let store = OtpSessionStore::new();
        let hash = sha256_hex("123456");
        store.start_register("sid", draft(), hash.clone(), 100, 50);

        let out = store.consume_register("sid", &hash, 60).unwrap();
        assert_eq!(out.email, "a@x.com");

        // Consumed exactly once.
        assert_eq!(
            store.consume_register("sid", &hash, 61),
            Err(OtpFailure::Missing)
        );
        assert!(!store.has_register_draft("sid", 62));
    }

    #[test]
    fn test_register_wrong_code_leaves_challenge() {
        let store = OtpSessionStore::new();
        store.start_register("sid", draft(), sha256_hex("123456"), 100, 50);

        assert_eq!(
            store.consume_register("sid", &sha256_hex("654321"), 60),
            Err(OtpFailure::Invalid)
        );
        // Correct code still works afterwards.
        assert!(store.consume_register("sid", &sha256_hex("123456"), 70).is_ok());
    }

    #[test]
    fn test_register_expired_code_is_consumed() {
        let store = OtpSessionStore::new();
        let hash = sha256_hex("123456");
        store.start_register("sid", draft(), hash.clone(), 100, 50);

        assert_eq!(
            store.consume_register("sid", &hash, 101),
            Err(OtpFailure::Expired)
        );
        // The pair was cleared by expiry; a correct code now reports Missing.
        assert_eq!(
            store.consume_register("sid", &hash, 102),
            Err(OtpFailure::Missing)
        );
    }

    #[test]
    fn test_register_missing_without_request() {
        let store = OtpSessionStore::new();
        assert_eq!(
            store.consume_register("sid", &sha256_hex("123456"), 10),
            Err(OtpFailure::Missing)
        );
    }

    #[test]
    fn test_forgot_gate_progression() {
        let store = OtpSessionStore::new();
        assert_eq!(store.forgot_gate("sid", 10), ForgotGate::EmailMissing);

        let hash = sha256_hex("123456");
        store.start_forgot("sid", "a@x.com".to_string(), hash.clone(), 100, 50);
        assert_eq!(store.forgot_gate("sid", 51), ForgotGate::NotVerified);

        store.verify_forgot("sid", &hash, 60).unwrap();
        assert_eq!(
            store.forgot_gate("sid", 61),
            ForgotGate::Verified("a@x.com".to_string())
        );

        store.clear_forgot("sid", 62);
        assert_eq!(store.forgot_gate("sid", 63), ForgotGate::EmailMissing);
    }

    #[test]
    fn test_forgot_code_single_use() {
        let store = OtpSessionStore::new();
        let hash = sha256_hex("123456");
        store.start_forgot("sid", "a@x.com".to_string(), hash.clone(), 100, 50);

        assert!(store.verify_forgot("sid", &hash, 60).is_ok());
        assert_eq!(
            store.verify_forgot("sid", &hash, 61),
            Err(OtpFailure::Missing)
        );
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = OtpSessionStore::new();
        let hash = sha256_hex("123456");
        store.start_register("sid-a", draft(), hash.clone(), 100, 50);

        assert_eq!(
            store.consume_register("sid-b", &hash, 60),
            Err(OtpFailure::Missing)
        );
        assert!(store.consume_register("sid-a", &hash, 60).is_ok());
    }

    #[test]
    fn test_flows_use_disjoint_namespaces() {
        let store = OtpSessionStore::new();
        let reg_hash = sha256_hex("111111");
        let forgot_hash = sha256_hex("222222");
        store.start_register("sid", draft(), reg_hash.clone(), 100, 50);
        store.start_forgot("sid", "a@x.com".to_string(), forgot_hash.clone(), 100, 50);

        // Verifying forgot does not disturb the register challenge.
        store.verify_forgot("sid", &forgot_hash, 60).unwrap();
        assert!(store.consume_register("sid", &reg_hash, 61).is_ok());
    }

    #[test]
    fn test_purge_stale_drops_old_sessions() {
        let store = OtpSessionStore::new();
        store.start_register("old", draft(), sha256_hex("111111"), 100, 10);
        store.start_register("new", draft(), sha256_hex("222222"), 200, 90);

        let removed = store.purge_stale(50);
        assert_eq!(removed, 1);
        assert!(!store.has_register_draft("old", 91));
        assert!(store.has_register_draft("new", 92));
    }
}
