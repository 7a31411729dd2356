use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::{AppServices, StoreKind};

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let store = match services.store_kind {
        StoreKind::InMemory => "memory",
        StoreKind::Postgres => "postgres",
    };
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "data": {
                "status": "ok",
                "store": store,
                "cache": services.directory.cache_enabled(),
            }
        })),
    )
}
