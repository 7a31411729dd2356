use std::sync::Arc;

use axum::{extract::Extension, response::Response, routing::get, Router};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::Authenticated;

pub fn router() -> Router {
    Router::new()
        .route("/", get(me))
        .route("/organizations", get(my_organizations))
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
) -> Result<Response, ApiError> {
    let user = services
        .directory
        .user(principal.id)
        .await?
        .ok_or_else(|| ApiError::internal("resolved principal has no account row"))?;
    let profile = services.directory.profile(principal.id).await?;
    dto::ok(dto::user_to_json(&user, profile.as_ref()))
}

/// Organizations the caller is a live member of.
pub async fn my_organizations(
    Extension(services): Extension<Arc<AppServices>>,
    Authenticated(principal): Authenticated,
) -> Result<Response, ApiError> {
    let items = services
        .directory
        .organizations_for_user(principal.id)
        .await?
        .iter()
        .map(dto::organization_to_json)
        .collect::<Vec<_>>();
    dto::ok(serde_json::json!({ "items": items }))
}
