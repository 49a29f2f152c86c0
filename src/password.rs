//! Password hashing via bcrypt.

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash a plaintext password. Produces a salted, adaptive hash.
pub fn hash_password(plaintext: &str) -> Result<String, PasswordHashError> {
    bcrypt::hash(plaintext, BCRYPT_COST).map_err(PasswordHashError)
}

/// Verify a plaintext password against a stored hash.
///
/// A malformed or truncated hash is treated as a non-match rather than an
/// error; callers only ever see a boolean.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

/// Error hashing a password (bcrypt internal failure).
#[derive(Debug)]
pub struct PasswordHashError(bcrypt::BcryptError);

impl std::fmt::Display for PasswordHashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to hash password: {}", self.0)
    }
}

impl std::error::Error for PasswordHashError {}
