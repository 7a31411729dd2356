//! API-side authorization guards.
//!
//! Handlers call these before touching any org-scoped data; the decision is
//! made by the access resolver and only mapped to HTTP here.

use orgwarden_auth::{GlobalRequirement, Permission, Principal};
use orgwarden_core::OrganizationId;
use orgwarden_infra::OrgScope;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// Require the principal to hold `required` in the organization.
pub async fn org_scope(
    services: &AppServices,
    principal: &Principal,
    organization_id: OrganizationId,
    required: &[Permission],
) -> Result<OrgScope, ApiError> {
    Ok(services
        .access
        .authorize_org(principal, organization_id, required)
        .await?)
}

/// Require the principal's global role to meet `requirement`.
pub fn global_role(
    services: &AppServices,
    principal: &Principal,
    requirement: GlobalRequirement,
) -> Result<(), ApiError> {
    Ok(services.access.require_global(principal, requirement)?)
}
