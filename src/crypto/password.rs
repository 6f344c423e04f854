//! Password hashing with PBKDF2-HMAC-SHA256.
//!
//! Stored form: `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`, so the
//! iteration count can be raised later without invalidating old hashes.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const HASH_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 72;

const SCHEME: &str = "pbkdf2-sha256";

/// Hashes and verifies account passwords.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(PBKDF2_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hash a new password. Rejects lengths outside 8..=72 characters.
    pub fn hash(&self, password: &str) -> Result<String, CryptoError> {
        check_password_length(password)?;
        let salt = generate_salt();
        let mut hash = derive(password, &salt, self.iterations);
        let encoded = format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(hash)
        );
        hash.zeroize();
        Ok(encoded)
    }

    /// Constant-time check of `password` against a stored hash. The
    /// iteration count comes from the stored value, not from `self`.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, CryptoError> {
        let mut parts = stored.split('$');
        let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(CryptoError::MalformedHash);
        };
        let iterations: u32 = iterations.parse().map_err(|_| CryptoError::MalformedHash)?;
        let salt = STANDARD_NO_PAD
            .decode(salt)
            .map_err(|_| CryptoError::MalformedHash)?;
        let expected = STANDARD_NO_PAD
            .decode(expected)
            .map_err(|_| CryptoError::MalformedHash)?;
        if iterations == 0 || expected.len() != HASH_LENGTH {
            return Err(CryptoError::MalformedHash);
        }

        let mut actual = derive(password, &salt, iterations);
        let matches = actual.ct_eq(expected.as_slice()).into();
        actual.zeroize();
        Ok(matches)
    }
}

pub fn check_password_length(password: &str) -> Result<(), CryptoError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
        return Err(CryptoError::PasswordLength {
            min: MIN_PASSWORD_LENGTH,
            max: MAX_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Generate a cryptographically random salt
fn generate_salt() -> [u8; SALT_LENGTH] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
