//! Opaque secret generation and hashing for the refresh token ledger.
//!
//! Raw secrets are handed to the client exactly once; only their SHA-256
//! hex digest is ever stored, so a database read-leak cannot be replayed.

use std::fmt::Write;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};

/// Number of random bytes in a raw refresh secret.
const SECRET_BYTES: usize = 32;

/// Process-wide source of cryptographically secure secrets.
///
/// Owned by the auth service rather than hidden in a thread-local so that
/// every caller of OTP/secret generation goes through one explicit instance.
pub struct SecretSource {
    rng: Mutex<StdRng>,
}

impl SecretSource {
    /// Create a new source seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Generate a raw opaque refresh secret (32 random bytes, hex encoded).
    pub fn opaque_secret(&self) -> String {
        let mut buf = [0u8; SECRET_BYTES];
        self.rng
            .lock()
            .expect("secret rng poisoned")
            .fill_bytes(&mut buf);
        hex_encode(&buf)
    }

    /// Generate a uniformly random 6-digit OTP code, zero-padded (000000-999999).
    pub fn otp_code(&self) -> String {
        let mut rng = self.rng.lock().expect("secret rng poisoned");
        let n: u32 = rng.random_range(0..1_000_000);
        format!("{:06}", n)
    }
}

impl Default for SecretSource {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 hex digest of a string (refresh secrets and OTP codes).
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{:02x}", b).expect("writing to String cannot fail");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_secret_is_64_hex_chars() {
        let source = SecretSource::new();
        let secret = source.opaque_secret();
        assert_eq!(secret.len(), SECRET_BYTES * 2);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_opaque_secrets_are_unique() {
        let source = SecretSource::new();
        let a = source.opaque_secret();
        let b = source.opaque_secret();
        assert_ne!(a, b);
    }

    #[test]
    fn test_otp_code_is_6_digits() {
        let source = SecretSource::new();
        for _ in 0..100 {
            let code = source.otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_otp_codes_vary() {
        let source = SecretSource::new();
        let codes: std::collections::HashSet<String> =
            (0..100).map(|_| source.otp_code()).collect();
        assert!(codes.len() > 90, "codes should be mostly unique");
    }

    #[test]
    fn test_sha256_hex_known_value() {
        // echo -n "abc" | sha256sum
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_hex_differs_per_input() {
        assert_ne!(sha256_hex("123456"), sha256_hex("123457"));
    }
}
