//! Body and query extraction with field-level errors.
//!
//! Wraps axum's `Json` and `Query` so that malformed input, missing fields and
//! unknown fields answer with the usual `{ error, message, fields }`
//! validation body instead of axum's plain-text rejection.

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::app::errors::{ApiError, FieldError};

/// Drop-in for `Json<T>` in handler signatures. Must be the last extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::Validation(vec![rejection_field(rejection)])),
        }
    }
}

/// Drop-in for `Query<T>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(QueryRejection::FailedToDeserializeQueryString(err)) => {
                let detail = std::error::Error::source(&err)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| err.body_text());
                Err(ApiError::Validation(vec![data_error(&detail)]))
            }
            Err(_) => Err(ApiError::validation("query", "could not be read")),
        }
    }
}

fn rejection_field(rejection: JsonRejection) -> FieldError {
    match rejection {
        JsonRejection::JsonDataError(err) => {
            let detail = std::error::Error::source(&err)
                .map(ToString::to_string)
                .unwrap_or_else(|| err.body_text());
            data_error(&detail)
        }
        JsonRejection::JsonSyntaxError(_) => FieldError::new("body", "is not valid JSON"),
        JsonRejection::MissingJsonContentType(_) => {
            FieldError::new("body", "must be sent as application/json")
        }
        _ => FieldError::new("body", "could not be read"),
    }
}

/// serde reports `[path: ]message[ at line L column C]`.
fn data_error(detail: &str) -> FieldError {
    let detail = detail.split(" at line ").next().unwrap_or(detail);
    for (marker, message) in [
        ("missing field `", "is required"),
        ("unknown field `", "is not allowed"),
    ] {
        if let Some((_, rest)) = detail.split_once(marker) {
            if let Some((name, _)) = rest.split_once('`') {
                return FieldError::new(name, message);
            }
        }
    }
    match detail.split_once(": ") {
        Some((path, message)) if !path.is_empty() && !path.contains(char::is_whitespace) => {
            FieldError::new(path, message)
        }
        _ => FieldError::new("body", detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_unknown_fields_name_the_field() {
        assert_eq!(
            data_error("missing field `first_name` at line 1 column 58"),
            FieldError::new("first_name", "is required")
        );
        assert_eq!(
            data_error("unknown field `is_admin`, expected one of `email`, `password` at line 1 column 12"),
            FieldError::new("is_admin", "is not allowed")
        );
        assert_eq!(
            data_error("is_admin: unknown field `is_admin`, expected `email` at line 1 column 12"),
            FieldError::new("is_admin", "is not allowed")
        );
    }

    #[test]
    fn type_errors_carry_the_path() {
        assert_eq!(
            data_error("permissions[0]: invalid type: integer `1`, expected a string at line 1 column 30"),
            FieldError::new("permissions[0]", "invalid type: integer `1`, expected a string")
        );
        assert_eq!(
            data_error("invalid type: integer `1`, expected struct LoginRequest at line 1 column 1"),
            FieldError::new("body", "invalid type: integer `1`, expected struct LoginRequest")
        );
    }
}
