//! Registration, login and the activation / password-reset token flows.

use std::sync::Arc;

use axum::{
    extract::Extension,
    response::Response,
    routing::post,
    Router,
};
use chrono::Utc;
use tracing::{info, warn};

use orgwarden_auth::{
    check_login, normalize_email, validate_password, ActionPurpose, AuthzError, NewUser, PasswordHasher, User,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::notifier::{Notification, NotificationKind};
use crate::app::services::AppServices;
use crate::extract::ValidJson;

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/activate", post(activate))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset", post(reset_password))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    ValidJson(body): ValidJson<dto::RegisterRequest>,
) -> Result<Response, ApiError> {
    let new_user = NewUser::parse(&body.email, &body.password, &body.first_name, &body.last_name)?;
    let password_hash = hash_password(services.hasher, new_user.password.clone()).await?;

    let now = Utc::now();
    let (user, profile) = new_user.into_records(password_hash, now);
    services.directory.register_user(&user, &profile).await?;

    let token = services
        .activation_tokens
        .issue(ActionPurpose::Activation, &user.email, now)?;
    services
        .notifier
        .send(Notification {
            kind: NotificationKind::Activation,
            to: user.email.clone(),
            token,
        })
        .await;

    info!(user_id = %user.id, "user registered");
    dto::created(dto::user_to_json(&user, Some(&profile)))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    ValidJson(body): ValidJson<dto::LoginRequest>,
) -> Result<Response, ApiError> {
    let email = normalize_email(&body.email);
    let user = services.directory.find_user_by_email(&email).await?;

    let hasher = services.hasher;
    let candidate = user.clone();
    tokio::task::spawn_blocking(move || check_login(&hasher, candidate.as_ref(), &body.password))
        .await
        .map_err(ApiError::internal)??;
    let user = user.ok_or(ApiError::InvalidCredentials)?;

    let session = services
        .sessions
        .issue(user.id, Utc::now())
        .map_err(ApiError::internal)?;
    let profile = services.directory.profile(user.id).await?;

    info!(user_id = %user.id, "session issued");
    dto::ok(dto::session_to_json(&session, &user, profile.as_ref()))
}

pub async fn activate(
    Extension(services): Extension<Arc<AppServices>>,
    ValidJson(body): ValidJson<dto::ActivateRequest>,
) -> Result<Response, ApiError> {
    let now = Utc::now();
    let email = services.activation_tokens.verify(
        ActionPurpose::Activation,
        &body.token,
        services.config.activation_token_max_age,
        now,
    )?;

    let mut user = services
        .directory
        .find_user_by_email(&email)
        .await?
        .ok_or(ApiError::InvalidToken("token is invalid"))?;
    user.activate()?;
    let user = services.directory.update_user(&user).await?;
    let profile = services.directory.profile(user.id).await?;

    info!(user_id = %user.id, "account activated");
    dto::ok(dto::user_to_json(&user, profile.as_ref()))
}

/// Always answers 200 so the endpoint cannot be used to probe for accounts.
pub async fn forgot_password(
    Extension(services): Extension<Arc<AppServices>>,
    ValidJson(body): ValidJson<dto::ForgotPasswordRequest>,
) -> Result<Response, ApiError> {
    let email = normalize_email(&body.email);
    match services.directory.find_user_by_email(&email).await? {
        Some(user) if user.deleted_at.is_none() => {
            let token = services.reset_tokens.issue(
                ActionPurpose::PasswordReset,
                &reset_payload(&user),
                Utc::now(),
            )?;
            services
                .notifier
                .send(Notification {
                    kind: NotificationKind::PasswordReset,
                    to: user.email.clone(),
                    token,
                })
                .await;
        }
        _ => {}
    }

    dto::ok(serde_json::json!({
        "message": "if the account exists, a reset link has been sent",
    }))
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    ValidJson(body): ValidJson<dto::ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    validate_password(&body.password)?;

    let payload = services.reset_tokens.verify(
        ActionPurpose::PasswordReset,
        &body.token,
        services.config.reset_token_max_age,
        Utc::now(),
    )?;
    let (email, version) = payload
        .rsplit_once('\n')
        .ok_or(ApiError::InvalidToken("token is invalid"))?;

    let mut user = services
        .directory
        .find_user_by_email(email)
        .await?
        .ok_or(ApiError::InvalidToken("token is invalid"))?;
    if user.deleted_at.is_some() {
        return Err(ApiError::Denied(AuthzError::AccountDeactivated));
    }
    // The version moves on every write, so a token works once.
    if version != user.version.to_string() {
        return Err(ApiError::InvalidToken("token has already been used"));
    }

    let password_hash = hash_password(services.hasher, body.password).await?;
    user.set_password_hash(password_hash);
    let user = services.directory.update_user(&user).await?;

    info!(user_id = %user.id, "password reset");
    dto::ok(serde_json::json!({ "message": "password has been reset" }))
}

/// Email and current row version, newline separated.
fn reset_payload(user: &User) -> String {
    format!("{}\n{}", user.email, user.version)
}

/// bcrypt is CPU-bound; keep it off the async workers.
async fn hash_password(hasher: PasswordHasher, password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hasher.hash_password(&password))
        .await
        .map_err(|e| {
            warn!(error = %e, "password hashing task failed");
            ApiError::internal(e)
        })?
        .map_err(ApiError::from)
}
