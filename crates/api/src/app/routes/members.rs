use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, patch},
    Router,
};
use chrono::Utc;
use tracing::info;

use orgwarden_auth::normalize_email;
use orgwarden_auth::permissions::{ADD_MEMBER, REMOVE_MEMBER, UPDATE_MEMBER};
use orgwarden_core::{MemberId, OrganizationId, RoleId};
use orgwarden_organizations::OrganizationMember;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{member_in, parse_id, role_in};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::Authenticated;
use crate::extract::ValidJson;

/// Merged under `/organizations`.
pub fn router() -> Router {
    Router::new()
        .route("/:org_id/members", get(list_members).post(add_member))
        .route(
            "/:org_id/members/:member_id",
            patch(update_member).delete(remove_member),
        )
}

pub async fn list_members(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    authz::org_scope(&services, &principal, org_id, &[]).await?;

    let items = services
        .directory
        .members(org_id)
        .await?
        .iter()
        .map(dto::member_to_json)
        .collect::<Vec<_>>();
    dto::ok(serde_json::json!({ "items": items }))
}

pub async fn add_member(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(org_id): Path<String>,
    ValidJson(body): ValidJson<dto::AddMemberRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let role_id: RoleId = parse_id(&body.role_id)?;
    authz::org_scope(&services, &principal, org_id, &[ADD_MEMBER]).await?;

    let role = role_in(&services, org_id, role_id).await?;
    let user = services
        .directory
        .find_user_by_email(&normalize_email(&body.email))
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    if user.deleted_at.is_some() {
        return Err(ApiError::InvalidState("account has been deactivated".to_string()));
    }
    if services.directory.membership(org_id, user.id).await?.is_some() {
        return Err(ApiError::Duplicate("user is already a member".to_string()));
    }

    let member = OrganizationMember::new(org_id, user.id, role.id, Utc::now());
    services.directory.add_member(&member).await?;

    info!(organization_id = %org_id, user_id = %user.id, member_id = %member.id, "member added");
    dto::created(dto::member_to_json(&member))
}

/// Reassign a member to another role of the same organization.
pub async fn update_member(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path((org_id, member_id)): Path<(String, String)>,
    ValidJson(body): ValidJson<dto::UpdateMemberRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let member_id: MemberId = parse_id(&member_id)?;
    let role_id: RoleId = parse_id(&body.role_id)?;
    authz::org_scope(&services, &principal, org_id, &[UPDATE_MEMBER]).await?;

    let mut member = member_in(&services, org_id, member_id).await?;
    dto::check_version(body.version, member.version)?;
    let role = role_in(&services, org_id, role_id).await?;
    member.reassign(role.id);
    let member = services.directory.update_member(&member).await?;

    info!(organization_id = %org_id, %member_id, %role_id, "member reassigned");
    dto::ok(dto::member_to_json(&member))
}

pub async fn remove_member(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path((org_id, member_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let member_id: MemberId = parse_id(&member_id)?;
    authz::org_scope(&services, &principal, org_id, &[REMOVE_MEMBER]).await?;

    let member = member_in(&services, org_id, member_id).await?;
    let member = services.directory.remove_member(member, Utc::now()).await?;

    info!(organization_id = %org_id, %member_id, "member removed");
    dto::ok(dto::member_to_json(&member))
}
