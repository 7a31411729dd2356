use orgwarden_auth::{OrgAccess, RoleGrant};

use crate::{Organization, OrganizationMember, Role};

/// Reduce loaded entities to the facts the authorization policy evaluates.
///
/// Absent rows are passed as `None`. A membership or role that belongs to a
/// different organization, a removed membership, or a role that is not the
/// one the membership points at all count as unavailable.
pub fn access_facts(
    organization: Option<&Organization>,
    member: Option<&OrganizationMember>,
    role: Option<&Role>,
) -> OrgAccess {
    let Some(org) = organization else {
        return OrgAccess::default();
    };

    let grant = member
        .filter(|m| m.is_live() && m.organization_id == org.id)
        .map(|m| {
            let role = role.filter(|r| r.id == m.role_id && r.organization_id == org.id);
            match role {
                Some(role) => RoleGrant {
                    role_name: role.name.clone(),
                    role_unavailable: role.deleted_at.is_some(),
                    permissions: role.permissions.clone(),
                },
                None => RoleGrant {
                    role_name: String::new(),
                    role_unavailable: true,
                    permissions: Default::default(),
                },
            }
        });

    OrgAccess {
        organization_available: org.is_available(),
        grant,
    }
}
