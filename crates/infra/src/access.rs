//! Request authorization: principal resolution, account liveness,
//! organization scope and permission evaluation.
//!
//! The decision itself is the pure policy in `orgwarden_auth::authorize`;
//! this module only loads the facts it needs through the [`Directory`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use orgwarden_auth::{
    authorize, explain_authorization, require_global_role, AuthorizationExplanation, AuthzError,
    GlobalRequirement, OrgAccess, Permission, Principal, SessionVerifier,
};
use orgwarden_core::OrganizationId;
use orgwarden_organizations::{access_facts, Organization, OrganizationMember, Role};

use crate::directory::Directory;
use crate::store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error(transparent)]
    Denied(#[from] AuthzError),

    /// The store failed; never treated as an allow.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Loaded entities for an authorized org-scoped request.
#[derive(Debug, Clone)]
pub struct OrgScope {
    pub organization: Organization,
    pub member: OrganizationMember,
    pub role: Role,
}

#[derive(Clone)]
pub struct AccessResolver {
    directory: Arc<Directory>,
    sessions: Arc<dyn SessionVerifier>,
}

impl std::fmt::Debug for AccessResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessResolver")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl AccessResolver {
    pub fn new(directory: Arc<Directory>, sessions: Arc<dyn SessionVerifier>) -> Self {
        Self { directory, sessions }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Resolve the caller from an optional bearer token.
    ///
    /// No token is not an error (`Ok(None)`); anonymous access is decided by
    /// the route. A present token that fails verification, names an unknown
    /// account, or belongs to an account that is not live is `Denied`.
    pub async fn resolve_principal(
        &self,
        bearer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, AccessError> {
        let Some(token) = bearer else {
            return Ok(None);
        };

        let user_id = self.sessions.verify(token, now).map_err(|err| {
            debug!(error = %err, "session token rejected");
            AuthzError::Unauthenticated
        })?;

        let Some(user) = self.directory.user(user_id).await? else {
            debug!(%user_id, "session token names an unknown account");
            return Err(AuthzError::Unauthenticated.into());
        };

        let principal = Principal::from_user(&user);
        principal.ensure_live()?;
        Ok(Some(principal))
    }

    async fn load(
        &self,
        organization_id: OrganizationId,
        principal: &Principal,
    ) -> Result<(Option<Organization>, Option<OrganizationMember>, Option<Role>), StoreError> {
        let Some(organization) = self.directory.organization(organization_id).await? else {
            return Ok((None, None, None));
        };
        if !organization.is_available() {
            return Ok((Some(organization), None, None));
        }
        let Some(member) = self.directory.membership(organization_id, principal.id).await? else {
            return Ok((Some(organization), None, None));
        };
        let role = self.directory.role(member.role_id).await?;
        Ok((Some(organization), Some(member), role))
    }

    /// Facts only, for callers that want to evaluate the policy themselves.
    pub async fn access(
        &self,
        principal: &Principal,
        organization_id: OrganizationId,
    ) -> Result<OrgAccess, StoreError> {
        let (organization, member, role) = self.load(organization_id, principal).await?;
        Ok(access_facts(organization.as_ref(), member.as_ref(), role.as_ref()))
    }

    /// Authorize `principal` for `required` in an organization.
    ///
    /// Every absence (organization, membership, role) is a denial, never a
    /// not-found, so callers cannot probe for inactive organizations.
    pub async fn authorize_org(
        &self,
        principal: &Principal,
        organization_id: OrganizationId,
        required: &[Permission],
    ) -> Result<OrgScope, AccessError> {
        principal.ensure_live()?;

        let (organization, member, role) = self.load(organization_id, principal).await?;
        let facts = access_facts(organization.as_ref(), member.as_ref(), role.as_ref());
        authorize(principal, &facts, required)?;

        match (organization, member, role) {
            (Some(organization), Some(member), Some(role)) => Ok(OrgScope {
                organization,
                member,
                role,
            }),
            _ => Err(AuthzError::NotAMember.into()),
        }
    }

    pub fn require_global(
        &self,
        principal: &Principal,
        requirement: GlobalRequirement,
    ) -> Result<(), AccessError> {
        Ok(require_global_role(principal, requirement)?)
    }

    pub async fn explain(
        &self,
        principal: &Principal,
        organization_id: OrganizationId,
        required: &[Permission],
    ) -> Result<AuthorizationExplanation, AccessError> {
        let facts = self.access(principal, organization_id).await?;
        Ok(explain_authorization(principal, &facts, required))
    }
}
