pub mod code;
pub mod password;
pub mod token;

pub use code::*;
pub use password::*;
pub use token::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Password must be between {min} and {max} characters")]
    PasswordLength { min: usize, max: usize },

    #[error("Stored password hash is malformed")]
    MalformedHash,

    #[error("Token signing key must be at least {0} bytes")]
    WeakSigningKey(usize),

    #[error("Token encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
