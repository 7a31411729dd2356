//! Single-purpose action tokens (account activation, password reset).
//!
//! Action tokens are AES-256-GCM encrypted, not signed: the payload (usually
//! an email address) is confidential and the token is opaque to clients. The
//! wire layout is
//!
//! ```text
//! base64url( version:u8 | created_at:i64 BE | nonce:[u8; 12] | ciphertext+tag )
//! ```
//!
//! The purpose, version byte and creation timestamp are bound as associated
//! data, so a token minted for one purpose never verifies for another and the
//! timestamp cannot be rewritten without breaking the tag.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const TOKEN_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 8;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPurpose {
    Activation,
    PasswordReset,
}

impl ActionPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionPurpose::Activation => "activation",
            ActionPurpose::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionTokenError {
    #[error("action token has expired")]
    Expired,

    /// Tampered, truncated, foreign-key or wrong-purpose token.
    #[error("invalid action token")]
    Invalid,

    #[error("failed to encrypt action token")]
    Encrypt,
}

#[derive(Clone)]
pub struct ActionTokenCipher {
    cipher: Aes256Gcm,
}

impl ActionTokenCipher {
    /// Derive the AES-256 key from an arbitrary-length secret.
    pub fn new(secret: &SecretString) -> Self {
        let digest = Sha256::digest(secret.expose_secret().as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn issue(
        &self,
        purpose: ActionPurpose,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ActionTokenError> {
        let header = header(now.timestamp());
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: payload.as_bytes(),
                    aad: &associated_data(purpose, &header),
                },
            )
            .map_err(|_| ActionTokenError::Encrypt)?;

        let mut raw = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&header);
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Decrypt and check the age of a token.
    ///
    /// Authenticity is established before the age is looked at, so a forged
    /// timestamp is reported as `Invalid`, never `Expired`.
    pub fn verify(
        &self,
        purpose: ActionPurpose,
        token: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, ActionTokenError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| ActionTokenError::Invalid)?;
        if raw.len() < HEADER_LEN + NONCE_LEN + TAG_LEN || raw[0] != TOKEN_VERSION {
            return Err(ActionTokenError::Invalid);
        }

        let (header, rest) = raw.split_at(HEADER_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &associated_data(purpose, header),
                },
            )
            .map_err(|_| ActionTokenError::Invalid)?;

        let mut created = [0u8; 8];
        created.copy_from_slice(&header[1..HEADER_LEN]);
        let created_at = i64::from_be_bytes(created);
        if now.timestamp().saturating_sub(created_at) > max_age.num_seconds() {
            return Err(ActionTokenError::Expired);
        }

        String::from_utf8(plaintext).map_err(|_| ActionTokenError::Invalid)
    }
}

impl core::fmt::Debug for ActionTokenCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActionTokenCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn header(created_at: i64) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0] = TOKEN_VERSION;
    out[1..].copy_from_slice(&created_at.to_be_bytes());
    out
}

fn associated_data(purpose: ActionPurpose, header: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(purpose.as_str().len() + 1 + header.len());
    aad.extend_from_slice(purpose.as_str().as_bytes());
    aad.push(b'|');
    aad.extend_from_slice(header);
    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(secret: &str) -> ActionTokenCipher {
        ActionTokenCipher::new(&SecretString::from(secret.to_string()))
    }

    #[test]
    fn issue_then_verify_returns_payload() {
        let c = cipher("activation-secret");
        let now = Utc::now();
        let token = c.issue(ActionPurpose::Activation, "ada@example.com", now).unwrap();
        let payload = c
            .verify(ActionPurpose::Activation, &token, Duration::minutes(10), now)
            .unwrap();
        assert_eq!(payload, "ada@example.com");
    }

    #[test]
    fn expiry_boundary() {
        let c = cipher("reset-secret");
        let now = Utc::now();
        let max_age = Duration::minutes(60);
        let token = c.issue(ActionPurpose::PasswordReset, "ada@example.com", now).unwrap();

        let just_before = now + max_age - Duration::seconds(1);
        assert!(c.verify(ActionPurpose::PasswordReset, &token, max_age, just_before).is_ok());

        let just_after = now + max_age + Duration::seconds(1);
        assert_eq!(
            c.verify(ActionPurpose::PasswordReset, &token, max_age, just_after),
            Err(ActionTokenError::Expired)
        );
    }

    #[test]
    fn purpose_is_bound() {
        let c = cipher("shared-secret");
        let now = Utc::now();
        let token = c.issue(ActionPurpose::Activation, "ada@example.com", now).unwrap();
        assert_eq!(
            c.verify(ActionPurpose::PasswordReset, &token, Duration::hours(1), now),
            Err(ActionTokenError::Invalid)
        );
    }

    #[test]
    fn foreign_key_is_invalid() {
        let now = Utc::now();
        let token = cipher("one").issue(ActionPurpose::Activation, "x@example.com", now).unwrap();
        assert_eq!(
            cipher("two").verify(ActionPurpose::Activation, &token, Duration::hours(1), now),
            Err(ActionTokenError::Invalid)
        );
    }

    #[test]
    fn tampering_is_detected() {
        let c = cipher("secret");
        let now = Utc::now();
        let token = c.issue(ActionPurpose::Activation, "x@example.com", now).unwrap();

        let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        // Push the creation time forward to try and extend the token's life.
        raw[8] ^= 0x01;
        let forged = URL_SAFE_NO_PAD.encode(&raw);
        assert_eq!(
            c.verify(ActionPurpose::Activation, &forged, Duration::hours(1), now),
            Err(ActionTokenError::Invalid)
        );

        let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let forged = URL_SAFE_NO_PAD.encode(&raw);
        assert_eq!(
            c.verify(ActionPurpose::Activation, &forged, Duration::hours(1), now),
            Err(ActionTokenError::Invalid)
        );
    }

    #[test]
    fn garbage_and_truncation_are_invalid() {
        let c = cipher("secret");
        let now = Utc::now();
        for token in ["", "!!!", "AAAA", "eyJhbGciOiJIUzI1NiJ9.e30.sig"] {
            assert_eq!(
                c.verify(ActionPurpose::Activation, token, Duration::hours(1), now),
                Err(ActionTokenError::Invalid),
                "{token:?}"
            );
        }
    }

    #[test]
    fn tokens_are_not_deterministic() {
        let c = cipher("secret");
        let now = Utc::now();
        let a = c.issue(ActionPurpose::Activation, "x@example.com", now).unwrap();
        let b = c.issue(ActionPurpose::Activation, "x@example.com", now).unwrap();
        assert_ne!(a, b);
    }
}
