use serde::Serialize;

use orgwarden_core::UserId;

use crate::{AuthzError, GlobalRole, User};

/// Account state relevant to authentication, derived from the stored user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Active,
    /// Registered but email not verified yet.
    NotActivated,
    /// Soft-deactivated by staff; terminal.
    Deactivated,
}

/// Identity of an authenticated principal, resolved from a verified session
/// token and the *current* state of the account behind it.
///
/// Token validity and account state are independent: a principal built from a
/// still-valid token is rejected by [`Principal::ensure_live`] once the
/// account has been deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub role: GlobalRole,
    pub account: AccountState,
}

impl Principal {
    pub fn from_user(user: &User) -> Self {
        let account = if user.deleted_at.is_some() {
            AccountState::Deactivated
        } else if !user.is_active {
            AccountState::NotActivated
        } else {
            AccountState::Active
        };

        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            account,
        }
    }

    pub fn ensure_live(&self) -> Result<(), AuthzError> {
        match self.account {
            AccountState::Active => Ok(()),
            AccountState::NotActivated => Err(AuthzError::AccountNotActivated),
            AccountState::Deactivated => Err(AuthzError::AccountDeactivated),
        }
    }
}
