//! Cookie parsing and the refresh token cookie.

use axum::http::header;

/// Cookie name for the browser session id scoping OTP state.
pub const SESSION_COOKIE_NAME: &str = "session_id";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// SameSite attribute for the refresh cookie.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// How the refresh token cookie is issued and cleared.
#[derive(Clone)]
pub struct RefreshCookieConfig {
    pub name: String,
    pub path: String,
    pub secure: bool,
    pub same_site: SameSite,
    pub days: i64,
}

impl RefreshCookieConfig {
    /// Set-Cookie value carrying a raw refresh secret.
    pub fn build(&self, raw_secret: &str) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; HttpOnly; SameSite={}; Path={}; Max-Age={}{}",
            self.name,
            raw_secret,
            self.same_site.as_str(),
            self.path,
            self.days * 24 * 60 * 60,
            secure
        )
    }

    /// Set-Cookie value clearing the refresh cookie (empty value, zero age).
    pub fn clear(&self) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}=; HttpOnly; SameSite={}; Path={}; Max-Age=0{}",
            self.name,
            self.same_site.as_str(),
            self.path,
            secure
        )
    }
}
