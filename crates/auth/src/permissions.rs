use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Permission identifier.
///
/// Permissions are flat strings drawn from a closed catalog (e.g.
/// `"create_event"`). There is no hierarchy and no wildcard: a role either
/// holds the literal permission string or it does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Look a permission up in the catalog.
    pub fn parse(name: &str) -> Result<Self, UnknownPermission> {
        let name = name.trim();
        CATALOG
            .iter()
            .flat_map(|(_, names)| names.iter())
            .find(|candidate| **candidate == name)
            .map(|known| Self::from_static(*known))
            .ok_or_else(|| UnknownPermission(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Category this permission belongs to (always `Some` for catalog entries).
    pub fn category(&self) -> Option<PermissionCategory> {
        CATALOG
            .iter()
            .find(|(_, names)| names.iter().any(|name| *name == self.as_str()))
            .map(|(category, _)| *category)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown permission '{0}'")]
pub struct UnknownPermission(pub String);

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

pub const CREATE_EVENT: Permission = Permission::from_static("create_event");
pub const UPDATE_EVENT: Permission = Permission::from_static("update_event");
pub const DELETE_EVENT: Permission = Permission::from_static("delete_event");

pub const ADD_MEMBER: Permission = Permission::from_static("add_member");
pub const UPDATE_MEMBER: Permission = Permission::from_static("update_member");
pub const REMOVE_MEMBER: Permission = Permission::from_static("remove_member");

pub const CREATE_ROLE: Permission = Permission::from_static("create_role");
pub const UPDATE_ROLE: Permission = Permission::from_static("update_role");
pub const DELETE_ROLE: Permission = Permission::from_static("delete_role");

pub const UPDATE_ORG: Permission = Permission::from_static("update_org");
pub const DELETE_ORG: Permission = Permission::from_static("delete_org");

/// Grouping of catalog permissions, exposed to role-authoring clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCategory {
    Events,
    Members,
    Roles,
    Organizations,
}

impl PermissionCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionCategory::Events => "events",
            PermissionCategory::Members => "members",
            PermissionCategory::Roles => "roles",
            PermissionCategory::Organizations => "organizations",
        }
    }
}

static CATALOG: [(PermissionCategory, &[&str]); 4] = [
    (
        PermissionCategory::Events,
        &["create_event", "update_event", "delete_event"],
    ),
    (
        PermissionCategory::Members,
        &["add_member", "update_member", "remove_member"],
    ),
    (
        PermissionCategory::Roles,
        &["create_role", "update_role", "delete_role"],
    ),
    (PermissionCategory::Organizations, &["update_org", "delete_org"]),
];

/// One category of the read-only catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogGroup {
    pub category: PermissionCategory,
    pub permissions: Vec<&'static str>,
}

/// The full permission catalog, grouped by category, in a stable order.
pub fn catalog() -> Vec<CatalogGroup> {
    CATALOG
        .iter()
        .map(|(category, names)| CatalogGroup {
            category: *category,
            permissions: names.to_vec(),
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission sets
// ─────────────────────────────────────────────────────────────────────────────

/// Deduplicated, ordered set of catalog permissions held by a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every permission in the catalog (the default "sudo" role).
    pub fn all() -> Self {
        Self(
            CATALOG
                .iter()
                .flat_map(|(_, names)| names.iter())
                .map(|name| Permission::from_static(*name))
                .collect(),
        )
    }

    /// Build a set from raw names, rejecting anything outside the catalog.
    /// Duplicates collapse silently.
    pub fn from_names<I, S>(names: I) -> Result<Self, UnknownPermission>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| Permission::parse(name.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    /// `required ⊆ self`.
    pub fn contains_all(&self, required: &[Permission]) -> bool {
        required.iter().all(|p| self.contains(p))
    }

    /// Required permissions this set does not hold, in request order.
    pub fn missing<'a>(&self, required: &'a [Permission]) -> Vec<&'a Permission> {
        required.iter().filter(|p| !self.contains(p)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_names(&self) -> Vec<String> {
        self.0.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
