//! Persistent store: typed repositories with soft-delete visibility and
//! optimistic concurrency.
//!
//! ## Conventions
//!
//! - Lookups return `Ok(None)` when the row is absent or hidden by
//!   [`Visibility::Live`]; errors are reserved for the store itself.
//! - `update_*` is conditioned on the caller's `version`. On success the
//!   stored version is exactly `version + 1`; a stale version (or a vanished
//!   row) is [`StoreError::NotFound`] and nothing is written.
//! - Multi-row creation (organization + sudo role + founding member) is
//!   atomic.
//! - Role deletion and member writes serialize on the role row, so no live
//!   membership can end up bound to a deleted role.

pub mod memory;
pub mod postgres;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use orgwarden_auth::{User, UserProfile};
use orgwarden_core::{InviteId, MemberId, OrganizationId, RoleId, UserId};
use orgwarden_organizations::{Organization, OrganizationInvite, OrganizationMember, Role};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Row absent, or version mismatch on a conditional update.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Role deletion refused: live memberships still reference it.
    #[error("role is assigned to {members} live member(s)")]
    RoleInUse { members: u64 },

    #[error("database error: {0}")]
    Database(String),
}

/// Whether soft-deleted rows are visible to a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Live,
    IncludeDeleted,
}

impl Visibility {
    pub fn admits(self, deleted_at: Option<DateTime<Utc>>) -> bool {
        match self {
            Visibility::Live => deleted_at.is_none(),
            Visibility::IncludeDeleted => true,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user together with its profile. Email is unique.
    async fn create_user(&self, user: &User, profile: &UserProfile) -> Result<(), StoreError>;

    async fn get_user(&self, id: UserId, visibility: Visibility) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(
        &self,
        email: &str,
        visibility: Visibility,
    ) -> Result<Option<User>, StoreError>;

    async fn update_user(&self, user: &User) -> Result<User, StoreError>;

    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Atomically insert an organization, its sudo role and the founding
    /// membership. Names are globally unique.
    async fn create_organization(
        &self,
        organization: &Organization,
        sudo_role: &Role,
        founder: &OrganizationMember,
    ) -> Result<(), StoreError>;

    async fn get_organization(
        &self,
        id: OrganizationId,
        visibility: Visibility,
    ) -> Result<Option<Organization>, StoreError>;

    async fn find_organization_by_name(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> Result<Option<Organization>, StoreError>;

    async fn update_organization(&self, organization: &Organization) -> Result<Organization, StoreError>;

    /// Live organizations the user holds a live membership in, oldest first.
    async fn list_organizations_for_user(&self, user_id: UserId) -> Result<Vec<Organization>, StoreError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Role names are unique among an organization's live roles.
    async fn create_role(&self, role: &Role) -> Result<(), StoreError>;

    async fn get_role(&self, id: RoleId, visibility: Visibility) -> Result<Option<Role>, StoreError>;

    async fn find_role_by_name(
        &self,
        organization_id: OrganizationId,
        name: &str,
        visibility: Visibility,
    ) -> Result<Option<Role>, StoreError>;

    async fn list_roles(
        &self,
        organization_id: OrganizationId,
        visibility: Visibility,
    ) -> Result<Vec<Role>, StoreError>;

    async fn update_role(&self, role: &Role) -> Result<Role, StoreError>;

    /// Write a soft-deleted `role` only while no live membership references
    /// it. The count and the write are atomic with respect to member writes.
    async fn delete_role(&self, role: &Role) -> Result<Role, StoreError>;
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    /// At most one live membership per (organization, user). The bound role
    /// must be live, otherwise [`StoreError::NotFound`].
    async fn create_member(&self, member: &OrganizationMember) -> Result<(), StoreError>;

    async fn get_member(
        &self,
        id: MemberId,
        visibility: Visibility,
    ) -> Result<Option<OrganizationMember>, StoreError>;

    async fn find_member(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        visibility: Visibility,
    ) -> Result<Option<OrganizationMember>, StoreError>;

    async fn list_members(
        &self,
        organization_id: OrganizationId,
        visibility: Visibility,
    ) -> Result<Vec<OrganizationMember>, StoreError>;

    /// A live membership may only be bound to a live role.
    async fn update_member(&self, member: &OrganizationMember) -> Result<OrganizationMember, StoreError>;
}

#[async_trait]
pub trait InviteStore: Send + Sync {
    async fn create_invite(&self, invite: &OrganizationInvite) -> Result<(), StoreError>;

    async fn get_invite(
        &self,
        id: InviteId,
        visibility: Visibility,
    ) -> Result<Option<OrganizationInvite>, StoreError>;
}

/// The whole persistent store, as handed to the directory.
pub trait Store: UserStore + OrganizationStore + RoleStore + MemberStore + InviteStore {}

impl<T> Store for T where T: UserStore + OrganizationStore + RoleStore + MemberStore + InviteStore {}

/// Shared handle to whichever backend the process was configured with.
pub type SharedStore = Arc<dyn Store>;
