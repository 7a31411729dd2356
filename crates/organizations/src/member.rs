use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgwarden_core::{DomainError, Entity, MemberId, OrganizationId, RoleId, SoftDeletable, UserId};

/// Binding of a user to an organization through one role.
///
/// At most one live binding exists per (user, organization) pair. This is the
/// authorization-relevant join entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMember {
    pub id: MemberId,
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl OrganizationMember {
    pub fn new(
        organization_id: OrganizationId,
        user_id: UserId,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MemberId::new(),
            organization_id,
            user_id,
            role_id,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn reassign(&mut self, role_id: RoleId) {
        self.role_id = role_id;
    }

    pub fn remove(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.deleted_at.is_some() {
            return Err(DomainError::conflict("member already removed"));
        }
        self.deleted_at = Some(now);
        Ok(())
    }
}

impl Entity for OrganizationMember {
    type Id = MemberId;

    fn id(&self) -> MemberId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl SoftDeletable for OrganizationMember {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}
