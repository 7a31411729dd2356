use std::str::FromStr;

use orgwarden_core::{DomainError, MemberId, OrganizationId, RoleId};
use orgwarden_organizations::{OrganizationMember, Role};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// Parse a path or body id; malformed ids are a 400.
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(ApiError::from)
}

/// Live role belonging to `organization_id`.
///
/// Only called after the org-scope guard, so absence is reported as a
/// missing target rather than a denial.
pub async fn role_in(
    services: &AppServices,
    organization_id: OrganizationId,
    role_id: RoleId,
) -> Result<Role, ApiError> {
    services
        .directory
        .role(role_id)
        .await?
        .filter(|role| role.organization_id == organization_id && role.deleted_at.is_none())
        .ok_or(ApiError::NotFound("role"))
}

/// Live membership record belonging to `organization_id`.
pub async fn member_in(
    services: &AppServices,
    organization_id: OrganizationId,
    member_id: MemberId,
) -> Result<OrganizationMember, ApiError> {
    services
        .directory
        .member(member_id)
        .await?
        .filter(|member| member.organization_id == organization_id && member.is_live())
        .ok_or(ApiError::NotFound("member"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_ids_are_bad_requests() {
        let err = parse_id::<OrganizationId>("not-a-uuid").unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);

        let id = OrganizationId::new();
        assert_eq!(parse_id::<OrganizationId>(&id.to_string()).unwrap(), id);
    }
}
