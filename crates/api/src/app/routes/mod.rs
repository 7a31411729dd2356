use axum::{routing::get, Router};

pub mod admin;
pub mod auth;
pub mod common;
pub mod me;
pub mod members;
pub mod organizations;
pub mod permissions;
pub mod roles;
pub mod system;

/// Router for every endpoint except `/health`.
///
/// Anonymous requests reach every handler; each one decides whether a
/// principal is required.
pub fn router() -> Router {
    Router::new()
        .route("/permissions", get(permissions::list_permissions))
        .nest("/auth", auth::router())
        .nest("/me", me::router())
        .nest("/admin", admin::router())
        .nest("/organizations", organizations::router())
}
