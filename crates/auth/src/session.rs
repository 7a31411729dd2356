//! Session token issuance and verification (HS256 JWT).
//!
//! Session tokens are stateless bearer credentials. Verification fails closed:
//! any missing or malformed claim, a foreign algorithm, a bad signature or a
//! wrong issuer/audience is a hard rejection.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use orgwarden_core::UserId;

use crate::claims::{validate_claims, SessionClaims, TokenValidationError};

const REQUIRED_CLAIMS: [&str; 5] = ["exp", "nbf", "sub", "iss", "aud"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token signed with an unexpected algorithm")]
    InvalidAlgorithm,

    #[error("token is missing required claim '{0}'")]
    MissingClaim(String),

    #[error("token issuer mismatch")]
    InvalidIssuer,

    #[error("token audience mismatch")]
    InvalidAudience,

    #[error(transparent)]
    Time(#[from] TokenValidationError),

    #[error("failed to sign token: {0}")]
    Encode(String),
}

/// Verifies bearer tokens and yields the subject.
///
/// Kept as a trait so the request pipeline does not depend on the signing
/// scheme.
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, TokenError>;
}

/// Session token settings, built once from configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: SecretString,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
    pub leeway_secs: i64,
}

/// A freshly signed session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl: Duration,
    leeway_secs: i64,
}

impl SessionIssuer {
    pub fn new(config: SessionConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();

        // Time claims are validated against an injected clock in
        // `validate_claims`, so the library's wall-clock checks are disabled.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&REQUIRED_CLAIMS);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer: config.issuer,
            audience: config.audience,
            ttl: config.ttl,
            leeway_secs: config.leeway_secs,
        }
    }

    pub fn issue(&self, principal: UserId, now: DateTime<Utc>) -> Result<SignedToken, TokenError> {
        let expires_at = now + self.ttl;
        let claims = SessionClaims {
            sub: principal,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))?;

        Ok(SignedToken { token, expires_at })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl SessionVerifier for SessionIssuer {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => TokenError::InvalidAlgorithm,
                ErrorKind::MissingRequiredClaim(claim) => TokenError::MissingClaim(claim.clone()),
                ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
                ErrorKind::InvalidAudience => TokenError::InvalidAudience,
                ErrorKind::Json(err) => match missing_field(&err.to_string()) {
                    Some(claim) => TokenError::MissingClaim(claim),
                    None => TokenError::Malformed,
                },
                _ => TokenError::Malformed,
            }
        })?;

        validate_claims(&data.claims, now, self.leeway_secs)?;
        Ok(data.claims.sub)
    }
}

/// Claims are deserialized before the registered-claim checks run, so an
/// absent claim surfaces as serde's "missing field `name`".
fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (name, _) = rest.split_once('`')?;
    Some(name.to_string())
}

impl core::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn config(secret: &str, issuer: &str, audience: &str) -> SessionConfig {
        SessionConfig {
            secret: SecretString::from(secret.to_string()),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            ttl: Duration::hours(24),
            leeway_secs: 0,
        }
    }

    fn issuer() -> SessionIssuer {
        SessionIssuer::new(config(SECRET, "orgwarden", "orgwarden-api"))
    }

    fn raw_token(alg: Algorithm, claims: serde_json::Value) -> String {
        encode(&Header::new(alg), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn issue_then_verify_yields_subject() {
        let now = Utc::now();
        let user = UserId::new();
        let signed = issuer().issue(user, now).unwrap();
        assert_eq!(signed.expires_at, now + Duration::hours(24));
        assert_eq!(issuer().verify(&signed.token, now).unwrap(), user);
    }

    #[test]
    fn expired_token_rejected() {
        let now = Utc::now();
        let signed = issuer().issue(UserId::new(), now).unwrap();
        let later = now + Duration::hours(24) + Duration::seconds(1);
        assert_eq!(
            issuer().verify(&signed.token, later),
            Err(TokenError::Time(TokenValidationError::Expired))
        );
    }

    #[test]
    fn foreign_secret_rejected() {
        let now = Utc::now();
        let other = SessionIssuer::new(config("another-secret", "orgwarden", "orgwarden-api"));
        let signed = other.issue(UserId::new(), now).unwrap();
        assert_eq!(issuer().verify(&signed.token, now), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn audience_and_issuer_must_match() {
        let now = Utc::now();
        let wrong_aud = SessionIssuer::new(config(SECRET, "orgwarden", "someone-else"));
        let token = wrong_aud.issue(UserId::new(), now).unwrap().token;
        assert_eq!(issuer().verify(&token, now), Err(TokenError::InvalidAudience));

        let wrong_iss = SessionIssuer::new(config(SECRET, "impostor", "orgwarden-api"));
        let token = wrong_iss.issue(UserId::new(), now).unwrap().token;
        assert_eq!(issuer().verify(&token, now), Err(TokenError::InvalidIssuer));
    }

    #[test]
    fn unexpected_algorithm_rejected() {
        let now = Utc::now().timestamp();
        let token = raw_token(
            Algorithm::HS512,
            json!({
                "sub": UserId::new(), "iat": now, "nbf": now, "exp": now + 60,
                "iss": "orgwarden", "aud": "orgwarden-api",
            }),
        );
        assert_eq!(issuer().verify(&token, Utc::now()), Err(TokenError::InvalidAlgorithm));
    }

    #[test]
    fn expiration_claim_is_mandatory() {
        let now = Utc::now().timestamp();
        let token = raw_token(
            Algorithm::HS256,
            json!({
                "sub": UserId::new(), "iat": now, "nbf": now,
                "iss": "orgwarden", "aud": "orgwarden-api",
            }),
        );
        assert_eq!(
            issuer().verify(&token, Utc::now()),
            Err(TokenError::MissingClaim("exp".to_string()))
        );
    }

    #[test]
    fn every_registered_claim_is_mandatory() {
        let now = Utc::now().timestamp();
        let full = json!({
            "sub": UserId::new(), "iat": now, "nbf": now, "exp": now + 60,
            "iss": "orgwarden", "aud": "orgwarden-api",
        });
        for claim in ["sub", "iat", "nbf", "iss", "aud"] {
            let mut claims = full.clone();
            claims.as_object_mut().unwrap().remove(claim);
            let token = raw_token(Algorithm::HS256, claims);
            assert_eq!(
                issuer().verify(&token, Utc::now()),
                Err(TokenError::MissingClaim(claim.to_string())),
                "claim {claim}"
            );
        }
    }

    #[test]
    fn missing_field_reads_the_serde_message() {
        assert_eq!(missing_field("missing field `exp` at line 1 column 80").as_deref(), Some("exp"));
        assert_eq!(missing_field("invalid type: string, expected i64"), None);
    }

    #[test]
    fn non_uuid_subject_is_malformed() {
        let now = Utc::now().timestamp();
        let token = raw_token(
            Algorithm::HS256,
            json!({
                "sub": "root", "iat": now, "nbf": now, "exp": now + 60,
                "iss": "orgwarden", "aud": "orgwarden-api",
            }),
        );
        assert_eq!(issuer().verify(&token, Utc::now()), Err(TokenError::Malformed));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(issuer().verify("not.a.jwt", Utc::now()), Err(TokenError::Malformed));
        assert_eq!(issuer().verify("", Utc::now()), Err(TokenError::Malformed));
    }
}
