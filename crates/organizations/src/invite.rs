use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgwarden_core::{Entity, InviteId, OrganizationId, RoleId, SoftDeletable, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

/// Pending membership grant.
///
/// Only the record shape is modelled; there is no accept/decline workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationInvite {
    pub id: InviteId,
    pub organization_id: OrganizationId,
    pub email: String,
    pub role_id: RoleId,
    pub invited_by: UserId,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl OrganizationInvite {
    pub fn new(
        organization_id: OrganizationId,
        email: String,
        role_id: RoleId,
        invited_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InviteId::new(),
            organization_id,
            email,
            role_id,
            invited_by,
            accepted_at: None,
            declined_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn status(&self) -> InviteStatus {
        match (self.accepted_at, self.declined_at) {
            (Some(_), _) => InviteStatus::Accepted,
            (None, Some(_)) => InviteStatus::Declined,
            (None, None) => InviteStatus::Pending,
        }
    }
}

impl Entity for OrganizationInvite {
    type Id = InviteId;

    fn id(&self) -> InviteId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl SoftDeletable for OrganizationInvite {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_derived_from_timestamps() {
        let mut invite = OrganizationInvite::new(
            OrganizationId::new(),
            "new@example.com".to_string(),
            RoleId::new(),
            UserId::new(),
            Utc::now(),
        );
        assert_eq!(invite.status(), InviteStatus::Pending);
        invite.declined_at = Some(Utc::now());
        assert_eq!(invite.status(), InviteStatus::Declined);
        invite.accepted_at = Some(Utc::now());
        assert_eq!(invite.status(), InviteStatus::Accepted);
    }
}
