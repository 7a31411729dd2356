use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::info;

use orgwarden_auth::permissions::{DELETE_ORG, UPDATE_ORG};
use orgwarden_auth::Permission;
use orgwarden_core::OrganizationId;
use orgwarden_organizations::{NewOrganization, OrganizationMember, OrganizationPatch, Role};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::{common::parse_id, members, roles};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::Authenticated;
use crate::extract::{ValidJson, ValidQuery};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_organization))
        .route(
            "/:org_id",
            get(get_organization)
                .patch(update_organization)
                .delete(delete_organization),
        )
        .route("/:org_id/access", get(explain_access))
        .merge(roles::router())
        .merge(members::router())
}

/// Any authenticated account may found an organization; the founder becomes
/// its first member through the built-in `sudo` role.
pub async fn create_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    ValidJson(body): ValidJson<dto::CreateOrganizationRequest>,
) -> Result<Response, ApiError> {
    let new_org = NewOrganization::parse(
        &body.name,
        body.description.as_deref(),
        body.profile_pic.as_deref(),
    )?;

    let now = Utc::now();
    let organization = new_org.into_organization(now);
    let sudo = Role::sudo(organization.id, now);
    let founder = OrganizationMember::new(organization.id, principal.id, sudo.id, now);
    services
        .directory
        .create_organization(&organization, &sudo, &founder)
        .await?;

    info!(organization_id = %organization.id, founder = %principal.id, "organization created");
    dto::created(serde_json::json!({
        "organization": dto::organization_to_json(&organization),
        "role": dto::role_to_json(&sudo),
        "member": dto::member_to_json(&founder),
    }))
}

pub async fn get_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let scope = authz::org_scope(&services, &principal, org_id, &[]).await?;
    dto::ok(dto::organization_to_json(&scope.organization))
}

pub async fn update_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(org_id): Path<String>,
    ValidJson(body): ValidJson<dto::UpdateOrganizationRequest>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let scope = authz::org_scope(&services, &principal, org_id, &[UPDATE_ORG]).await?;

    let patch = OrganizationPatch::parse(
        body.name.as_deref(),
        body.description.as_deref(),
        body.profile_pic.as_deref(),
    )?;
    if patch.is_empty() {
        return Err(ApiError::BadRequest("nothing to update".to_string()));
    }

    let mut organization = scope.organization;
    dto::check_version(body.version, organization.version)?;
    patch.apply(&mut organization);
    let organization = services.directory.update_organization(&organization).await?;

    dto::ok(dto::organization_to_json(&organization))
}

/// Soft delete. Every later org-scoped request is denied.
pub async fn delete_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let scope = authz::org_scope(&services, &principal, org_id, &[DELETE_ORG]).await?;

    let mut organization = scope.organization;
    organization.soft_delete(Utc::now())?;
    let organization = services.directory.update_organization(&organization).await?;

    info!(organization_id = %org_id, "organization deleted");
    dto::ok(dto::organization_to_json(&organization))
}

/// "Why was I denied?": the decision for `?permission=a,b` plus the facts
/// behind it. Always 200 for an authenticated caller.
pub async fn explain_access(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(org_id): Path<String>,
    ValidQuery(query): ValidQuery<dto::AccessQuery>,
) -> Result<Response, ApiError> {
    let org_id: OrganizationId = parse_id(&org_id)?;
    let required = query
        .permission
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Permission::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::validation("permission", e.to_string()))?;

    let explanation = services.access.explain(&principal, org_id, &required).await?;
    dto::ok(serde_json::to_value(explanation).map_err(ApiError::internal)?)
}
