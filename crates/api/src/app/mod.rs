//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, cache, token and notification wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod notifier;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> Result<Router, services::ServiceError> {
    let services = Arc::new(services::AppServices::build(config).await?);
    Ok(build_router(services))
}

/// Router over already-built services (tests supply in-memory ones).
///
/// Layer order, outermost first: request context (id, span, deadline), then
/// principal resolution, then the handlers.
pub fn build_router(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    services.clone(),
                    middleware::request_context,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    services.clone(),
                    middleware::auth_middleware,
                ))
                .layer(Extension(services)),
        )
}

pub use services::AppServices;
