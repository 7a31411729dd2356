//! User accounts and profiles.
//!
//! A user is created inactive on registration, activated through a one-time
//! action token, and soft-deactivated by staff. Users are never hard-deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgwarden_core::{DomainError, Entity, ProfileId, SoftDeletable, UserId};

use crate::GlobalRole;

const MIN_PASSWORD_LEN: usize = 8;
// bcrypt silently truncates beyond 72 bytes.
const MAX_PASSWORD_LEN: usize = 72;
const MAX_NAME_LEN: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// User account (the authenticated principal's backing record).
///
/// # Invariants
/// - `email` is normalized (trimmed, lowercase) and globally unique.
/// - `deleted_at` is only ever set once (deactivation is terminal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub role: GlobalRole,
    /// Email verified through the activation flow.
    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Active and not deactivated.
    pub fn is_live(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    pub fn activate(&mut self) -> Result<(), DomainError> {
        if self.deleted_at.is_some() {
            return Err(DomainError::invariant("cannot activate a deactivated account"));
        }
        if self.is_active {
            return Err(DomainError::conflict("account already activated"));
        }
        self.is_active = true;
        Ok(())
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.deleted_at.is_some() {
            return Err(DomainError::conflict("account already deactivated"));
        }
        self.deleted_at = Some(now);
        Ok(())
    }

    pub fn set_password_hash(&mut self, hash: String) {
        self.password_hash = hash;
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl SoftDeletable for User {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Profile owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

/// Validated registration input.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewUser {
    /// Validate and normalize raw registration fields.
    ///
    /// Returns every field error, not just the first one.
    pub fn parse(
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Self, Vec<DomainError>> {
        let mut errors = Vec::new();

        let email = normalize_email(email);
        if let Err(e) = validate_email(&email) {
            errors.push(e);
        }
        if let Err(e) = validate_password(password) {
            errors.push(e);
        }
        for (field, value) in [("first_name", first_name), ("last_name", last_name)] {
            let value = value.trim();
            if value.is_empty() {
                errors.push(DomainError::validation(field, "must not be empty"));
            } else if value.chars().count() > MAX_NAME_LEN {
                errors.push(DomainError::validation(
                    field,
                    format!("must be at most {MAX_NAME_LEN} characters"),
                ));
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            email,
            password: password.to_string(),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
        })
    }

    /// Build the inactive user + profile rows for persistence.
    pub fn into_records(self, password_hash: String, now: DateTime<Utc>) -> (User, UserProfile) {
        let user = User {
            id: UserId::new(),
            email: self.email,
            password_hash,
            role: GlobalRole::Client,
            is_active: false,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let profile = UserProfile {
            id: ProfileId::new(),
            user_id: user.id,
            first_name: self.first_name,
            last_name: self.last_name,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        (user, profile)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DomainError::validation("email", "must be a valid email address"));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(DomainError::validation("email", "must be a valid email address"));
    }
    if email.len() > 254 {
        return Err(DomainError::validation("email", "must be at most 254 characters"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(DomainError::validation(
            "password",
            format!("must be at most {MAX_PASSWORD_LEN} bytes"),
        ));
    }
    Ok(())
}
