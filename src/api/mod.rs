mod auth;
mod error;
mod health;

use axum::Router;
use std::sync::Arc;

use crate::auth::{AuthService, RefreshCookieConfig};
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;

pub use auth::AuthApiState;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    auth: Arc<AuthService>,
    jwt: Arc<JwtConfig>,
    refresh_cookie: RefreshCookieConfig,
) -> Router {
    let auth_state = AuthApiState {
        auth,
        db,
        jwt,
        refresh_cookie,
        rate_limits: Arc::new(RateLimitConfig::new()),
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .merge(health::router())
}
