//! Platform administration, gated by global role rather than membership.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::patch,
    Router,
};
use chrono::Utc;
use tracing::info;

use orgwarden_auth::GlobalRequirement;
use orgwarden_core::{OrganizationId, UserId};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::Authenticated;

pub fn router() -> Router {
    Router::new()
        .route("/users/:user_id/deactivate", patch(deactivate_user))
        .route("/organizations/:org_id/deactivate", patch(deactivate_organization))
}

/// Staff or admin. The account keeps its rows; sessions stop resolving.
pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    authz::global_role(&services, &principal, GlobalRequirement::StaffOrAdmin)?;
    let user_id: UserId = parse_id(&user_id)?;

    let mut user = services
        .directory
        .user(user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    user.deactivate(Utc::now())?;
    let user = services.directory.update_user(&user).await?;

    info!(%user_id, by = %principal.id, "user deactivated");
    dto::ok(dto::user_to_json(&user, None))
}

/// Admin only. Clears the active flag; the organization is not deleted.
pub async fn deactivate_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
    Path(org_id): Path<String>,
) -> Result<Response, ApiError> {
    authz::global_role(&services, &principal, GlobalRequirement::Admin)?;
    let org_id: OrganizationId = parse_id(&org_id)?;

    let mut organization = services
        .directory
        .organization(org_id)
        .await?
        .ok_or(ApiError::NotFound("organization"))?;
    organization.deactivate()?;
    let organization = services.directory.update_organization(&organization).await?;

    info!(organization_id = %org_id, "organization deactivated");
    dto::ok(dto::organization_to_json(&organization))
}
