//! HS256 bearer tokens.
//!
//! Compact JWT form: `base64url(header).base64url(claims).base64url(mac)`.
//! The signature is checked before the claims are decoded.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroize;

use super::CryptoError;
use crate::models::Role;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,
    #[error("Invalid token signature")]
    BadSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Token is not valid for this operation")]
    WrongKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    PasswordReset,
    EmailVerification,
    VideoRoom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl Claims {
    pub fn new(sub: Uuid, email: &str, role: Role, kind: TokenKind, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub,
            email: email.to_string(),
            role,
            kind,
            iat: now,
            exp: now + ttl.num_seconds(),
            room: None,
        }
    }

    pub fn with_room(mut self, room: &str) -> Self {
        self.room = Some(room.to_string());
        self
    }

    /// Seconds until expiry, never negative.
    pub fn expires_in(&self) -> i64 {
        (self.exp - self.iat).max(0)
    }
}

#[derive(Serialize, Deserialize)]
struct Header<'a> {
    alg: &'a str,
    typ: &'a str,
}

#[derive(Zeroize)]
#[zeroize(drop)]
struct SigningKey(Vec<u8>);

/// Signs and verifies tokens with one shared secret.
pub struct TokenSigner {
    key: SigningKey,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSigner([REDACTED])")
    }
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(CryptoError::WeakSigningKey(MIN_SECRET_LENGTH));
        }
        Ok(Self {
            key: SigningKey(secret.to_vec()),
        })
    }

    fn mac(&self) -> Result<HmacSha256, hmac::digest::InvalidLength> {
        HmacSha256::new_from_slice(&self.key.0)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, CryptoError> {
        let header = serde_json::to_vec(&Header {
            alg: "HS256",
            typ: "JWT",
        })?;
        let body = serde_json::to_vec(claims)?;
        let message = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(body)
        );
        let mut mac = self
            .mac()
            .map_err(|_| CryptoError::WeakSigningKey(MIN_SECRET_LENGTH))?;
        mac.update(message.as_bytes());
        let signature = mac.finalize().into_bytes();
        Ok(format!("{message}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify signature, expiry and kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.kind != expected {
            return Err(TokenError::WrongKind);
        }
        Ok(claims)
    }

    /// Verify signature and expiry, accepting any kind.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(body), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac().map_err(|_| TokenError::BadSignature)?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let header = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| TokenError::Malformed)?;
        let header: Header = serde_json::from_slice(&header).map_err(|_| TokenError::Malformed)?;
        if header.alg != "HS256" {
            return Err(TokenError::Malformed);
        }

        let body = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&body).map_err(|_| TokenError::Malformed)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn signer() -> TokenSigner {
        TokenSigner::new(SECRET).unwrap()
    }

    fn claims(kind: TokenKind, ttl: Duration) -> Claims {
        Claims::new(Uuid::new_v4(), "jane@example.com", Role::Patient, kind, ttl)
    }

    #[test]
    fn sign_then_verify() {
        let signer = signer();
        let claims = claims(TokenKind::Access, Duration::minutes(60));
        let token = signer.sign(&claims).unwrap();
        assert_eq!(token.split('.').count(), 3);
        let decoded = signer.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.expires_in(), 3600);
    }

    #[test]
    fn claims_use_type_field_on_the_wire() {
        let json = serde_json::to_value(claims(TokenKind::PasswordReset, Duration::hours(1))).unwrap();
        assert_eq!(json["type"], "password_reset");
        assert_eq!(json["role"], "patient");
        assert!(json.get("room").is_none());
    }

    #[test]
    fn wrong_kind_rejected() {
        let signer = signer();
        let token = signer
            .sign(&claims(TokenKind::Refresh, Duration::days(7)))
            .unwrap();
        assert_eq!(
            signer.verify(&token, TokenKind::Access),
            Err(TokenError::WrongKind)
        );
    }

    #[test]
    fn expired_rejected() {
        let signer = signer();
        let token = signer
            .sign(&claims(TokenKind::Access, Duration::seconds(-5)))
            .unwrap();
        assert_eq!(signer.decode(&token), Err(TokenError::Expired));
    }

    #[test]
    fn tampered_body_rejected() {
        let signer = signer();
        let token = signer
            .sign(&claims(TokenKind::Access, Duration::minutes(5)))
            .unwrap();
        let mut forged = claims(TokenKind::Access, Duration::minutes(5));
        forged.role = Role::SuperAdmin;
        let forged_body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_body, parts[2]);
        assert_eq!(signer.decode(&tampered), Err(TokenError::BadSignature));
    }

    #[test]
    fn other_secret_rejected() {
        let token = signer()
            .sign(&claims(TokenKind::Access, Duration::minutes(5)))
            .unwrap();
        let other = TokenSigner::new(b"ffffffffffffffffffffffffffffffff").unwrap();
        assert_eq!(other.decode(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = signer();
        assert_eq!(signer.decode("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(signer.decode("a.b.c.d"), Err(TokenError::Malformed));
        assert_eq!(signer.decode("a.b.!!!"), Err(TokenError::Malformed));
    }

    #[test]
    fn room_claim_survives() {
        let signer = signer();
        let claims = claims(TokenKind::VideoRoom, Duration::hours(2)).with_room("room-abc");
        let token = signer.sign(&claims).unwrap();
        let decoded = signer.verify(&token, TokenKind::VideoRoom).unwrap();
        assert_eq!(decoded.room.as_deref(), Some("room-abc"));
    }

    #[test]
    fn short_secret_refused() {
        assert!(matches!(
            TokenSigner::new(b"short"),
            Err(CryptoError::WeakSigningKey(MIN_SECRET_LENGTH))
        ));
    }
}
