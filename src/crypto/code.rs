//! Six-digit verification codes, stored as SHA-256 digests.

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const CODE_LENGTH: usize = 6;
pub const CODE_TTL_MINUTES: i64 = 15;
pub const MAX_CODE_ATTEMPTS: i64 = 5;

pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}

/// Hex SHA-256 of the code, the only form persisted.
pub fn hash_code(code: &str) -> String {
    let digest = Sha256::digest(code.trim().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn code_matches(code: &str, stored_hash: &str) -> bool {
    hash_code(code).as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

pub fn is_well_formed_code(code: &str) -> bool {
    let code = code.trim();
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert!(is_well_formed_code(&code), "{code}");
        }
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = hash_code("123456");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_code(" 123456 "));
        assert_ne!(h, hash_code("123457"));
    }

    #[test]
    fn matches_only_same_code() {
        let stored = hash_code("042042");
        assert!(code_matches("042042", &stored));
        assert!(!code_matches("042043", &stored));
    }

    #[test]
    fn well_formed_check() {
        assert!(!is_well_formed_code("12345"));
        assert!(!is_well_formed_code("12345a"));
        assert!(!is_well_formed_code("1234567"));
    }
}
