use thiserror::Error;

use crate::User;

/// Lowest cost bcrypt accepts; used by tests and local development.
pub const MIN_COST: u32 = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Unknown email or wrong password. Deliberately indistinguishable.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account has not been activated")]
    Inactive,

    #[error("account has been deactivated")]
    Deactivated,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// bcrypt password hashing with a configured work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, 31),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash_password(&self, password: &str) -> Result<String, CredentialError> {
        bcrypt::hash(password, self.cost).map_err(|e| CredentialError::Hash(e.to_string()))
    }

    /// `false` for a mismatch and for an unparseable stored hash alike.
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

/// Check a login attempt against the stored account.
///
/// The password is verified before the account state is revealed, so callers
/// without the password learn nothing beyond "invalid credentials". An
/// unknown email costs one bcrypt round at the configured work factor, the
/// same as a wrong password.
pub fn check_login(
    hasher: &PasswordHasher,
    user: Option<&User>,
    password: &str,
) -> Result<(), CredentialError> {
    let Some(user) = user else {
        let _ = hasher.hash_password(password);
        return Err(CredentialError::InvalidCredentials);
    };
    if !hasher.verify_password(password, &user.password_hash) {
        return Err(CredentialError::InvalidCredentials);
    }
    if user.deleted_at.is_some() {
        return Err(CredentialError::Deactivated);
    }
    if !user.is_active {
        return Err(CredentialError::Inactive);
    }
    Ok(())
}
