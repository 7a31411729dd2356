use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orgwarden_core::UserId;

/// Session token claims (registered JWT claims only).
///
/// Every field is mandatory on verification; a token missing any of them is
/// rejected outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject / principal identifier.
    pub sub: UserId,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Not-before (unix seconds).
    pub nbf: i64,

    /// Expiration (unix seconds).
    pub exp: i64,

    pub iss: String,

    pub aud: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time window of session claims.
///
/// Signature, issuer and audience are checked while decoding; this covers the
/// time-based claims against an injected clock. `leeway_secs` widens both ends
/// of the window.
pub fn validate_claims(
    claims: &SessionClaims,
    now: DateTime<Utc>,
    leeway_secs: i64,
) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now + leeway_secs < claims.nbf {
        return Err(TokenValidationError::NotYetValid);
    }
    if now - leeway_secs >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
