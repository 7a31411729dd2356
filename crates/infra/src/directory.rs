//! Cache-augmented access to the store.
//!
//! Reads go cache → store → populate. Writes go to the store and then delete
//! the affected cache entries (invalidate-on-write, never update-in-place).
//! A failing cache is logged and treated as a miss; only the store's answer is
//! authoritative. With no cache configured every read goes to the store and
//! behaviour is otherwise identical.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use orgwarden_auth::{User, UserProfile};
use orgwarden_core::{DomainError, InviteId, MemberId, OrganizationId, RoleId, UserId};
use orgwarden_organizations::{Organization, OrganizationInvite, OrganizationMember, Role};

use crate::cache::{Cacheable, Caches, EntityCache, MemberKey};
use crate::store::{SharedStore, StoreError, Visibility};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The row changed (or vanished) since it was loaded.
    #[error("stale version: the record was modified concurrently")]
    StaleVersion,

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Role still referenced by live memberships.
    #[error("role is assigned to {members} active member(s)")]
    RoleInUse { members: u64 },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DirectoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => DirectoryError::StaleVersion,
            StoreError::Duplicate(what) => DirectoryError::Duplicate(what),
            StoreError::RoleInUse { members } => DirectoryError::RoleInUse { members },
            other => DirectoryError::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct Directory {
    store: SharedStore,
    caches: Option<Caches>,
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("cache_enabled", &self.caches.is_some())
            .finish_non_exhaustive()
    }
}

async fn read_through<E, F>(
    cache: Option<&EntityCache<E>>,
    key: &E::Key,
    load: F,
) -> Result<Option<E>, StoreError>
where
    E: Cacheable,
    F: Future<Output = Result<Option<E>, StoreError>>,
{
    if let Some(cache) = cache {
        match cache.get(key).await {
            Ok(Some(hit)) => return Ok(Some(hit)),
            Ok(None) => {}
            Err(err) => warn!(
                key = %EntityCache::<E>::key(key),
                error = %err,
                "cache read failed; falling back to store"
            ),
        }
    }

    let loaded = load.await?;

    if let (Some(cache), Some(entity)) = (cache, loaded.as_ref()) {
        if let Err(err) = cache.set(entity).await {
            warn!(key = %EntityCache::<E>::key(key), error = %err, "cache populate failed");
        }
    }
    Ok(loaded)
}

async fn invalidate<E: Cacheable>(cache: Option<&EntityCache<E>>, key: &E::Key) {
    let Some(cache) = cache else { return };
    match cache.delete(key).await {
        Ok(()) => debug!(key = %EntityCache::<E>::key(key), "cache entry invalidated"),
        Err(err) => warn!(key = %EntityCache::<E>::key(key), error = %err, "cache invalidation failed"),
    }
}

impl Directory {
    pub fn new(store: SharedStore, caches: Option<Caches>) -> Self {
        Self { store, caches }
    }

    pub fn cache_enabled(&self) -> bool {
        self.caches.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cached reads
    //
    // Soft-deleted rows are returned too: the authorization policy needs to
    // tell "deactivated" from "absent".
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        read_through(
            self.caches.as_ref().map(|c| &c.users),
            &id,
            self.store.get_user(id, Visibility::IncludeDeleted),
        )
        .await
    }

    pub async fn organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        read_through(
            self.caches.as_ref().map(|c| &c.organizations),
            &id,
            self.store.get_organization(id, Visibility::IncludeDeleted),
        )
        .await
    }

    pub async fn role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        read_through(
            self.caches.as_ref().map(|c| &c.roles),
            &id,
            self.store.get_role(id, Visibility::IncludeDeleted),
        )
        .await
    }

    /// The principal's live membership in an organization.
    pub async fn membership(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<Option<OrganizationMember>, StoreError> {
        let key = MemberKey {
            user_id,
            organization_id,
        };
        read_through(
            self.caches.as_ref().map(|c| &c.members),
            &key,
            self.store.find_member(organization_id, user_id, Visibility::Live),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Uncached reads
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.store.find_user_by_email(email, Visibility::IncludeDeleted).await
    }

    pub async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        self.store.get_profile(user_id).await
    }

    pub async fn organizations_for_user(&self, user_id: UserId) -> Result<Vec<Organization>, StoreError> {
        self.store.list_organizations_for_user(user_id).await
    }

    pub async fn roles(&self, organization_id: OrganizationId) -> Result<Vec<Role>, StoreError> {
        self.store.list_roles(organization_id, Visibility::Live).await
    }

    pub async fn members(&self, organization_id: OrganizationId) -> Result<Vec<OrganizationMember>, StoreError> {
        self.store.list_members(organization_id, Visibility::Live).await
    }

    pub async fn member(&self, id: MemberId) -> Result<Option<OrganizationMember>, StoreError> {
        self.store.get_member(id, Visibility::Live).await
    }

    pub async fn invite(&self, id: InviteId) -> Result<Option<OrganizationInvite>, StoreError> {
        self.store.get_invite(id, Visibility::Live).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn register_user(&self, user: &User, profile: &UserProfile) -> Result<(), DirectoryError> {
        self.store.create_user(user, profile).await?;
        Ok(())
    }

    pub async fn update_user(&self, user: &User) -> Result<User, DirectoryError> {
        let updated = self.store.update_user(user).await;
        invalidate(self.caches.as_ref().map(|c| &c.users), &user.id).await;
        Ok(updated?)
    }

    /// Organization, sudo role and founding membership, atomically.
    pub async fn create_organization(
        &self,
        organization: &Organization,
        sudo_role: &Role,
        founder: &OrganizationMember,
    ) -> Result<(), DirectoryError> {
        self.store
            .create_organization(organization, sudo_role, founder)
            .await?;
        invalidate(self.caches.as_ref().map(|c| &c.members), &founder.cache_key()).await;
        Ok(())
    }

    pub async fn update_organization(&self, organization: &Organization) -> Result<Organization, DirectoryError> {
        let updated = self.store.update_organization(organization).await;
        invalidate(
            self.caches.as_ref().map(|c| &c.organizations),
            &organization.id,
        )
        .await;
        Ok(updated?)
    }

    pub async fn create_role(&self, role: &Role) -> Result<(), DirectoryError> {
        self.store.create_role(role).await?;
        Ok(())
    }

    pub async fn update_role(&self, role: &Role) -> Result<Role, DirectoryError> {
        let updated = self.store.update_role(role).await;
        invalidate(self.caches.as_ref().map(|c| &c.roles), &role.id).await;
        Ok(updated?)
    }

    /// Soft-delete a role, refusing while any live membership references it.
    ///
    /// The store checks and writes atomically; a membership created
    /// concurrently either lands first (and the delete is refused) or finds
    /// the role gone.
    pub async fn delete_role(&self, mut role: Role, now: DateTime<Utc>) -> Result<Role, DirectoryError> {
        role.soft_delete(now)?;
        let deleted = self.store.delete_role(&role).await;
        invalidate(self.caches.as_ref().map(|c| &c.roles), &role.id).await;
        Ok(deleted?)
    }

    pub async fn add_member(&self, member: &OrganizationMember) -> Result<(), DirectoryError> {
        self.store.create_member(member).await?;
        invalidate(self.caches.as_ref().map(|c| &c.members), &member.cache_key()).await;
        Ok(())
    }

    pub async fn update_member(&self, member: &OrganizationMember) -> Result<OrganizationMember, DirectoryError> {
        let updated = self.store.update_member(member).await;
        invalidate(self.caches.as_ref().map(|c| &c.members), &member.cache_key()).await;
        Ok(updated?)
    }

    pub async fn remove_member(
        &self,
        mut member: OrganizationMember,
        now: DateTime<Utc>,
    ) -> Result<OrganizationMember, DirectoryError> {
        member.remove(now)?;
        self.update_member(&member).await
    }

    pub async fn create_invite(&self, invite: &OrganizationInvite) -> Result<(), DirectoryError> {
        self.store.create_invite(invite).await?;
        Ok(())
    }
}
