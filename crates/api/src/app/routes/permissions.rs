use axum::response::Response;

use orgwarden_auth::catalog;

use crate::app::dto;
use crate::app::errors::ApiError;

/// Read-only permission catalog, grouped by category. Anonymous access.
pub async fn list_permissions() -> Result<Response, ApiError> {
    let groups = serde_json::to_value(catalog()).map_err(ApiError::internal)?;
    dto::ok(groups)
}
