use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgwarden_auth::PermissionSet;
use orgwarden_core::{DomainError, Entity, OrganizationId, RoleId, SoftDeletable};

use crate::validate::{optional_text, required_text};

pub const SUDO_ROLE_NAME: &str = "sudo";
pub const MAX_NAME_LEN: usize = 50;
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Organization-scoped, named bundle of permissions.
///
/// # Invariants
/// - `name` is unique among the organization's live roles.
/// - `permissions` only ever holds catalog entries.
/// - Cannot be soft-deleted while a live member references it (enforced by
///   the directory, not the database).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub description: String,
    pub permissions: PermissionSet,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    /// Default role created with every organization; holds the whole catalog.
    pub fn sudo(organization_id: OrganizationId, now: DateTime<Utc>) -> Self {
        Self {
            id: RoleId::new(),
            organization_id,
            name: SUDO_ROLE_NAME.to_string(),
            description: "Full access to the organization".to_string(),
            permissions: PermissionSet::all(),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.deleted_at.is_some() {
            return Err(DomainError::conflict("role already deleted"));
        }
        self.deleted_at = Some(now);
        Ok(())
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> RoleId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl SoftDeletable for Role {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

fn parse_permissions<S: AsRef<str>>(names: &[S], errors: &mut Vec<DomainError>) -> PermissionSet {
    match PermissionSet::from_names(names) {
        Ok(set) => set,
        Err(unknown) => {
            errors.push(DomainError::validation("permissions", unknown.to_string()));
            PermissionSet::new()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    pub description: String,
    pub permissions: PermissionSet,
}

impl NewRole {
    pub fn parse<S: AsRef<str>>(
        name: &str,
        description: Option<&str>,
        permissions: &[S],
    ) -> Result<Self, Vec<DomainError>> {
        let mut errors = Vec::new();
        let name = required_text("name", name, MAX_NAME_LEN, &mut errors);
        let description = optional_text(
            "description",
            description.unwrap_or_default(),
            MAX_DESCRIPTION_LEN,
            &mut errors,
        );
        let permissions = parse_permissions(permissions, &mut errors);

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Self {
            name,
            description,
            permissions,
        })
    }

    pub fn into_role(self, organization_id: OrganizationId, now: DateTime<Utc>) -> Role {
        Role {
            id: RoleId::new(),
            organization_id,
            name: self.name,
            description: self.description,
            permissions: self.permissions,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Partial role update; `None` keeps the current value. A given permission
/// list replaces the role's set wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<PermissionSet>,
}

impl RolePatch {
    pub fn parse<S: AsRef<str>>(
        name: Option<&str>,
        description: Option<&str>,
        permissions: Option<&[S]>,
    ) -> Result<Self, Vec<DomainError>> {
        let mut errors = Vec::new();
        let patch = Self {
            name: name.map(|n| required_text("name", n, MAX_NAME_LEN, &mut errors)),
            description: description
                .map(|d| optional_text("description", d, MAX_DESCRIPTION_LEN, &mut errors)),
            permissions: permissions.map(|p| parse_permissions(p, &mut errors)),
        };
        if errors.is_empty() {
            Ok(patch)
        } else {
            Err(errors)
        }
    }

    pub fn apply(self, role: &mut Role) {
        if let Some(name) = self.name {
            role.name = name;
        }
        if let Some(description) = self.description {
            role.description = description;
        }
        if let Some(permissions) = self.permissions {
            role.permissions = permissions;
        }
    }
}

#[cfg(test)]
mod tests {
    use orgwarden_auth::permissions::{CREATE_EVENT, DELETE_ORG};

    use super::*;

    #[test]
    fn sudo_holds_the_whole_catalog() {
        let role = Role::sudo(OrganizationId::new(), Utc::now());
        assert_eq!(role.name, SUDO_ROLE_NAME);
        assert_eq!(role.permissions, PermissionSet::all());
    }

    #[test]
    fn new_role_deduplicates_permissions() {
        let role = NewRole::parse("Events", None, &["create_event", "create_event"]).unwrap();
        assert_eq!(role.permissions.len(), 1);
        assert!(role.permissions.contains(&CREATE_EVENT));
    }

    #[test]
    fn new_role_rejects_unknown_permission_and_long_name() {
        let errors = NewRole::parse(&"r".repeat(51), None, &["create_event", "fly"]).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[1], DomainError::Validation { field, .. } if field == "permissions"));
    }

    #[test]
    fn empty_permission_list_is_allowed() {
        let empty: [&str; 0] = [];
        assert!(NewRole::parse("Viewer", Some("read only"), &empty).unwrap().permissions.is_empty());
    }

    #[test]
    fn patch_replaces_permission_set() {
        let mut role = NewRole::parse("Events", None, &["create_event"])
            .unwrap()
            .into_role(OrganizationId::new(), Utc::now());
        RolePatch::parse(None, None, Some(&["delete_org"][..]))
            .unwrap()
            .apply(&mut role);
        assert!(!role.permissions.contains(&CREATE_EVENT));
        assert!(role.permissions.contains(&DELETE_ORG));
        assert_eq!(role.name, "Events");
    }

    #[test]
    fn soft_delete_once() {
        let mut role = Role::sudo(OrganizationId::new(), Utc::now());
        role.soft_delete(Utc::now()).unwrap();
        assert!(role.is_deleted());
        assert!(role.soft_delete(Utc::now()).is_err());
    }
}
