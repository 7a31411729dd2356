use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::get,
    Router,
};
use chrono::Utc;
use tracing::info;

use orgwarden_auth::permissions::{CREATE_ROLE, DELETE_ROLE, UPDATE_ROLE};
use orgwarden_core::{OrganizationId, RoleId};
use orgwarden_organizations::{NewRole, RolePatch};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{parse_id, role_in};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::Authenticated;
use crate::extract::ValidJson;

/// Merged under `/organizations`.
pub fn router() -> Router {
    Router::new()
        .route("/:org_id/roles", get(list_roles).post(create_role))
        .route(
            "/:org_id/roles/:role_id",
            get(get_role).patch(update_role).delete(delete_role),
        )
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    authz::org_scope(&services, &principal, org_id, &[]).await?;

    let items = services
        .directory
        .roles(org_id)
        .await?
        .iter()
        .map(dto::role_to_json)
        .collect::<Vec<_>>();
    dto::ok(serde_json::json!({ "items": items }))
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(org_id): Path<String>,
    ValidJson(body): ValidJson<dto::CreateRoleRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    authz::org_scope(&services, &principal, org_id, &[CREATE_ROLE]).await?;

    let role = NewRole::parse(&body.name, body.description.as_deref(), &body.permissions)?
        .into_role(org_id, Utc::now());
    services.directory.create_role(&role).await?;

    info!(organization_id = %org_id, role_id = %role.id, "role created");
    dto::created(dto::role_to_json(&role))
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path((org_id, role_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let role_id: RoleId = parse_id(&role_id)?;
    authz::org_scope(&services, &principal, org_id, &[]).await?;

    let role = role_in(&services, org_id, role_id).await?;
    dto::ok(dto::role_to_json(&role))
}

/// A permission list replaces the role's set; members holding the role see
/// the change on their next request.
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path((org_id, role_id)): Path<(String, String)>,
    ValidJson(body): ValidJson<dto::UpdateRoleRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let role_id: RoleId = parse_id(&role_id)?;
    authz::org_scope(&services, &principal, org_id, &[UPDATE_ROLE]).await?;

    let patch = RolePatch::parse(
        body.name.as_deref(),
        body.description.as_deref(),
        body.permissions.as_deref(),
    )?;

    let mut role = role_in(&services, org_id, role_id).await?;
    dto::check_version(body.version, role.version)?;
    patch.apply(&mut role);
    let role = services.directory.update_role(&role).await?;

    info!(organization_id = %org_id, %role_id, "role updated");
    dto::ok(dto::role_to_json(&role))
}

/// Refused with `role_in_use` while any live member holds the role.
pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path((org_id, role_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let role_id: RoleId = parse_id(&role_id)?;
    authz::org_scope(&services, &principal, org_id, &[DELETE_ROLE]).await?;

    let role = role_in(&services, org_id, role_id).await?;
    let role = services.directory.delete_role(role, Utc::now()).await?;

    info!(organization_id = %org_id, %role_id, "role deleted");
    dto::ok(dto::role_to_json(&role))
}
