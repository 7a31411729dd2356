//! Consistent JSON error responses.
//!
//! Every failure is `{ "error": <code>, "message": <text> }`; validation
//! failures add `"fields": [{ "field", "message" }]`. Internal errors are
//! logged here with the wrapped cause and answered with a generic body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use orgwarden_auth::{ActionTokenError, AuthzError, CredentialError};
use orgwarden_core::DomainError;
use orgwarden_infra::{AccessError, DirectoryError, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    /// A target entity inside an already-authorized scope is absent.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Denied(AuthzError),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    InvalidToken(&'static str),

    #[error("{0}")]
    Duplicate(String),

    #[error("the record was modified concurrently; reload and retry")]
    Conflict,

    #[error("role is still assigned to {0} member(s)")]
    RoleInUse(u64),

    #[error("{0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::BadRequest(_)
            | ApiError::NotFound(_)
            | ApiError::InvalidToken(_)
            | ApiError::RoleInUse(_)
            | ApiError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ApiError::Denied(e) if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
            ApiError::Denied(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Duplicate(_) | ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Denied(e) if e.is_unauthorized() => "unauthorized",
            ApiError::Denied(_) => "forbidden",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::InvalidToken(_) => "invalid_token",
            ApiError::Duplicate(_) => "duplicate",
            ApiError::Conflict => "conflict",
            ApiError::RoleInUse(_) => "role_in_use",
            ApiError::InvalidState(_) => "invalid_state",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(fields) => (
                status,
                axum::Json(json!({
                    "error": "validation_error",
                    "message": "validation failed",
                    "fields": fields,
                })),
            )
                .into_response(),
            ApiError::Internal(cause) => {
                // The request span carries request id, method and path.
                tracing::error!(error = %cause, "request failed with internal error");
                json_error(status, "internal_error", "internal server error")
            }
            other => json_error(status, other.code(), other.to_string()),
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

impl From<Vec<DomainError>> for ApiError {
    fn from(errors: Vec<DomainError>) -> Self {
        ApiError::Validation(
            errors
                .into_iter()
                .map(|e| match e {
                    DomainError::Validation { field, message } => FieldError { field, message },
                    other => FieldError {
                        field: String::new(),
                        message: other.to_string(),
                    },
                })
                .collect(),
        )
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { .. } => vec![err].into(),
            DomainError::InvalidId(msg) => ApiError::BadRequest(msg),
            DomainError::NotFound => ApiError::NotFound("record"),
            DomainError::Duplicate(msg) => ApiError::Duplicate(msg),
            DomainError::Conflict(msg) | DomainError::InvariantViolation(msg) => ApiError::InvalidState(msg),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Denied(err)
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Denied(e) => ApiError::Denied(e),
            AccessError::Store(e) => ApiError::internal(e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(msg) => ApiError::Duplicate(msg),
            StoreError::NotFound => ApiError::Conflict,
            StoreError::RoleInUse { members } => ApiError::RoleInUse(members),
            StoreError::Database(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::StaleVersion => ApiError::Conflict,
            DirectoryError::Duplicate(msg) => ApiError::Duplicate(msg),
            DirectoryError::RoleInUse { members } => ApiError::RoleInUse(members),
            DirectoryError::Domain(e) => e.into(),
            DirectoryError::Store(e) => ApiError::internal(e),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidCredentials => ApiError::InvalidCredentials,
            CredentialError::Inactive => ApiError::Denied(AuthzError::AccountNotActivated),
            CredentialError::Deactivated => ApiError::Denied(AuthzError::AccountDeactivated),
            CredentialError::Hash(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ActionTokenError> for ApiError {
    fn from(err: ActionTokenError) -> Self {
        match err {
            ActionTokenError::Expired => ApiError::InvalidToken("token has expired"),
            ActionTokenError::Invalid => ApiError::InvalidToken("token is invalid"),
            ActionTokenError::Encrypt => ApiError::internal("action token encryption failed"),
        }
    }
}
