//! Request-scoped values attached by the middleware.
//!
//! Absence is never an implicit allow: handlers go through
//! [`CurrentPrincipal::require`] or the org-scope guard.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use orgwarden_auth::{AuthzError, Principal};

use crate::app::errors::ApiError;

/// Caller identity for a request. `None` means anonymous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentPrincipal(Option<Principal>);

impl CurrentPrincipal {
    pub fn new(principal: Option<Principal>) -> Self {
        Self(principal)
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    /// The principal, or `Unauthenticated`.
    pub fn require(&self) -> Result<&Principal, ApiError> {
        self.0
            .as_ref()
            .ok_or(ApiError::Denied(AuthzError::Unauthenticated))
    }
}

/// The caller of a protected route.
///
/// A parts extractor, so an anonymous request is answered 401 before the
/// body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let current = parts
            .extensions
            .get::<CurrentPrincipal>()
            .ok_or(ApiError::Denied(AuthzError::Unauthenticated))?;
        current.require().cloned().map(Self)
    }
}

/// Correlation id for a request (`x-request-id`, generated when absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};
    use orgwarden_auth::{AccountState, GlobalRole};
    use orgwarden_core::UserId;

    use super::*;

    fn parts(current: Option<CurrentPrincipal>) -> Parts {
        let (mut parts, _) = Request::new(()).into_parts();
        if let Some(current) = current {
            parts.extensions.insert(current);
        }
        parts
    }

    #[tokio::test]
    async fn anonymous_callers_are_rejected_before_the_handler() {
        for current in [None, Some(CurrentPrincipal::anonymous())] {
            let err = Authenticated::from_request_parts(&mut parts(current), &())
                .await
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn resolved_principal_is_passed_through() {
        let principal = Principal {
            id: UserId::new(),
            email: "ada@example.com".to_string(),
            role: GlobalRole::Client,
            account: AccountState::Active,
        };
        let current = CurrentPrincipal::new(Some(principal.clone()));
        let Authenticated(found) = Authenticated::from_request_parts(&mut parts(Some(current)), &())
            .await
            .unwrap();
        assert_eq!(found, principal);
    }
}
