//! Identity and session lifecycle management.
//!
//! The orchestrator ([`AuthService`]) ties together the credential store,
//! password hasher, token signer, refresh token ledger, OTP session store,
//! and mail dispatcher for each public flow: register, forgot-password,
//! login, refresh, logout, change-password.

mod cookie;
mod error;
mod extract;
mod service;

pub use cookie::{RefreshCookieConfig, SameSite, SESSION_COOKIE_NAME, get_cookie};
pub use error::AuthError;
pub use extract::{AuthRejection, AuthUser, HasAuthState};
pub use service::{AuthConfig, AuthService, LoginOutcome, RefreshOutcome};
