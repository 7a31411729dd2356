use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgwarden_core::{DomainError, Entity, OrganizationId, SoftDeletable};

use crate::validate::{optional_text, required_text};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_PICTURE_URL_LEN: usize = 2048;

/// Tenant of the system. Owns its roles and members.
///
/// # Invariants
/// - `name` is globally unique (enforced by the store).
/// - Only an available organization (active, not deleted) authorizes anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub description: String,
    pub profile_pic: Option<String>,
    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Organization {
    pub fn is_available(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    /// Platform-level deactivation (admin only). Reversible in principle,
    /// unlike deletion.
    pub fn deactivate(&mut self) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::conflict("organization already deactivated"));
        }
        self.is_active = false;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.deleted_at.is_some() {
            return Err(DomainError::conflict("organization already deleted"));
        }
        self.deleted_at = Some(now);
        Ok(())
    }
}

impl Entity for Organization {
    type Id = OrganizationId;

    fn id(&self) -> OrganizationId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl SoftDeletable for Organization {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Validated input for organization creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrganization {
    pub name: String,
    pub description: String,
    pub profile_pic: Option<String>,
}

impl NewOrganization {
    pub fn parse(
        name: &str,
        description: Option<&str>,
        profile_pic: Option<&str>,
    ) -> Result<Self, Vec<DomainError>> {
        let mut errors = Vec::new();
        let name = required_text("name", name, MAX_NAME_LEN, &mut errors);
        let description = optional_text(
            "description",
            description.unwrap_or_default(),
            MAX_DESCRIPTION_LEN,
            &mut errors,
        );
        let profile_pic = profile_pic
            .map(|url| optional_text("profile_pic", url, MAX_PICTURE_URL_LEN, &mut errors))
            .filter(|url| !url.is_empty());

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Self {
            name,
            description,
            profile_pic,
        })
    }

    pub fn into_organization(self, now: DateTime<Utc>) -> Organization {
        Organization {
            id: OrganizationId::new(),
            name: self.name,
            description: self.description,
            profile_pic: self.profile_pic,
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub profile_pic: Option<String>,
}

impl OrganizationPatch {
    pub fn parse(
        name: Option<&str>,
        description: Option<&str>,
        profile_pic: Option<&str>,
    ) -> Result<Self, Vec<DomainError>> {
        let mut errors = Vec::new();
        let patch = Self {
            name: name.map(|n| required_text("name", n, MAX_NAME_LEN, &mut errors)),
            description: description
                .map(|d| optional_text("description", d, MAX_DESCRIPTION_LEN, &mut errors)),
            profile_pic: profile_pic
                .map(|p| optional_text("profile_pic", p, MAX_PICTURE_URL_LEN, &mut errors)),
        };
        if errors.is_empty() {
            Ok(patch)
        } else {
            Err(errors)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.profile_pic.is_none()
    }

    /// Apply to a loaded organization. An empty picture URL clears it.
    pub fn apply(self, org: &mut Organization) {
        if let Some(name) = self.name {
            org.name = name;
        }
        if let Some(description) = self.description {
            org.description = description;
        }
        if let Some(pic) = self.profile_pic {
            org.profile_pic = (!pic.is_empty()).then_some(pic);
        }
    }
}
