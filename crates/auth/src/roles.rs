use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Platform-wide role of a user account.
///
/// Orthogonal to organization roles: it gates platform operations such as
/// deactivating another user's account or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalRole {
    Admin,
    Staff,
    #[default]
    Client,
}

impl GlobalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            GlobalRole::Admin => "admin",
            GlobalRole::Staff => "staff",
            GlobalRole::Client => "client",
        }
    }

    pub fn is_admin(self) -> bool {
        self == GlobalRole::Admin
    }

    pub fn is_staff_or_admin(self) -> bool {
        matches!(self, GlobalRole::Admin | GlobalRole::Staff)
    }
}

impl core::fmt::Display for GlobalRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GlobalRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(GlobalRole::Admin),
            "staff" => Ok(GlobalRole::Staff),
            "client" => Ok(GlobalRole::Client),
            other => Err(format!("unknown global role '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates() {
        assert!(GlobalRole::Admin.is_staff_or_admin());
        assert!(GlobalRole::Staff.is_staff_or_admin());
        assert!(!GlobalRole::Client.is_staff_or_admin());
        assert!(!GlobalRole::Staff.is_admin());
    }

    #[test]
    fn parses_stored_values() {
        assert_eq!("Staff".parse::<GlobalRole>().unwrap(), GlobalRole::Staff);
        assert!("owner".parse::<GlobalRole>().is_err());
        assert_eq!(GlobalRole::default(), GlobalRole::Client);
    }
}
