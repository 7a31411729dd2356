use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::app::errors::{json_error, ApiError};
use crate::app::services::AppServices;
use crate::context::{CurrentPrincipal, RequestId};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id, tracing span and the outer deadline.
///
/// The span carries `request_id`, `method` and `path`, so anything logged
/// while handling the request (including internal errors) is correlated.
pub async fn request_context(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let timeout = services.config.request_timeout;
    let mut response = async move {
        let started = std::time::Instant::now();
        let response = match tokio::time::timeout(timeout, next.run(req)).await {
            Ok(response) => response,
            Err(_) => json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "timeout",
                "request timed out",
            ),
        };
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Resolve the optional bearer token into a [`CurrentPrincipal`].
///
/// No `Authorization` header means anonymous; routes decide whether that is
/// acceptable. A header that is present but unusable, a token that fails
/// verification, or an account that is not live is rejected here with 401.
pub async fn auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let bearer = match extract_bearer(req.headers()) {
        Ok(bearer) => bearer,
        Err(err) => return err.into_response(),
    };

    let principal = match services.access.resolve_principal(bearer.as_deref(), Utc::now()).await {
        Ok(principal) => principal,
        Err(err) => return ApiError::from(err).into_response(),
    };

    req.extensions_mut().insert(CurrentPrincipal::new(principal));
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let unauthenticated = || ApiError::Denied(orgwarden_auth::AuthzError::Unauthenticated);

    let header = header.to_str().map_err(|_| unauthenticated())?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or_else(unauthenticated)?
        .trim();
    if token.is_empty() {
        return Err(unauthenticated());
    }

    Ok(Some(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn missing_header_is_anonymous() {
        assert_eq!(extract_bearer(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")).unwrap().as_deref(), Some("abc.def"));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(extract_bearer(&headers("Basic Zm9vOmJhcg==")).is_err());
        assert!(extract_bearer(&headers("Bearer    ")).is_err());
    }
}
