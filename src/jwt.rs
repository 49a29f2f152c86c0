//! Access token generation and validation.
//!
//! Access tokens are short-lived (minutes), stateless, and never revocable
//! individually; session continuity comes from the revocable refresh token
//! ledger in `db::refresh_token`.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::UserRole;

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user id)
    pub sub: String,
    /// User role
    pub role: UserRole,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl AccessClaims {
    /// Parse the subject back into a user id.
    pub fn user_id(&self) -> Result<i64, JwtError> {
        self.sub.parse().map_err(|_| JwtError::MalformedSubject)
    }
}

/// Configuration for access token operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_minutes: u64,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The signed token string
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration.
    pub fn new(secret: &[u8], issuer: &str, access_minutes: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            access_minutes,
        }
    }

    /// Generate an access token carrying the user's identity and role.
    pub fn generate_access_token(
        &self,
        user_id: i64,
        role: UserRole,
    ) -> Result<AccessTokenResult, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let lifetime = self.access_minutes * 60;
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            role,
            iat: now,
            exp: now + lifetime,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            expires_in: lifetime,
        })
    }

    /// Validate and decode an access token.
    ///
    /// Signature, issuer, and expiry failures all surface as [`JwtError`];
    /// callers treat any failure as absent authentication.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);

        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
                .map_err(JwtError::Decoding)?;

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Subject claim is not a user id
    MalformedSubject,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::MalformedSubject => write!(f, "Subject claim is not a user id"),
        }
    }
}

impl std::error::Error for JwtError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::new(b"test-secret-key-for-testing", "taskdeck-test", 15)
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let config = test_config();

        let result = config
            .generate_access_token(42, UserRole::Customer)
            .unwrap();
        assert_eq!(result.expires_in, 15 * 60);

        let claims = config.validate_access_token(&result.token).unwrap();
        assert_eq!(claims.iss, "taskdeck-test");
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.role, UserRole::Customer);
        assert_eq!(claims.exp, claims.iat + 15 * 60);
    }

    #[test]
    fn test_admin_role_in_token() {
        let config = test_config();

        let result = config.generate_access_token(7, UserRole::Admin).unwrap();

        let claims = config.validate_access_token(&result.token).unwrap();
        assert_eq!(claims.role, UserRole::Admin);
    }

    #[test]
    fn test_invalid_token() {
        let config = test_config();

        assert!(config.validate_access_token("garbage-token").is_err());
        assert!(config.validate_access_token("").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config1 = JwtConfig::new(b"secret-1", "taskdeck-test", 15);
        let config2 = JwtConfig::new(b"secret-2", "taskdeck-test", 15);

        let result = config1.generate_access_token(1, UserRole::Customer).unwrap();
        assert!(config2.validate_access_token(&result.token).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let config1 = JwtConfig::new(b"shared-secret-shared-secret", "issuer-a", 15);
        let config2 = JwtConfig::new(b"shared-secret-shared-secret", "issuer-b", 15);

        let result = config1.generate_access_token(1, UserRole::Customer).unwrap();
        assert!(config2.validate_access_token(&result.token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let secret = b"test-secret";
        let encoding_key = EncodingKey::from_secret(secret);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let claims = AccessClaims {
            iss: "taskdeck-test".to_string(),
            sub: "1".to_string(),
            role: UserRole::Customer,
            iat: now - 100,
            exp: now - 50,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &encoding_key).unwrap();

        let config = JwtConfig::new(secret, "taskdeck-test", 15);
        assert!(config.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_malformed_subject() {
        let claims = AccessClaims {
            iss: "x".to_string(),
            sub: "not-a-number".to_string(),
            role: UserRole::Customer,
            iat: 0,
            exp: 0,
        };
        assert!(claims.user_id().is_err());
    }
}
