//! Look-aside entity cache.
//!
//! Entities are stored as JSON snapshots under namespaced keys
//! (`<prefix>:<id>`, or `<prefix>:<userId>,<orgId>` for memberships). The
//! cache never holds the only copy of anything: a miss, an expired entry or a
//! failing backend all mean "ask the store".
//!
//! ## Contract
//!
//! - `get` returns `Ok(None)` on a miss; errors are transport or
//!   deserialization failures only.
//! - `set` overwrites with the entity type's TTL.
//! - `delete` is idempotent: deleting an absent key succeeds.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use orgwarden_auth::User;
use orgwarden_core::{OrganizationId, RoleId, UserId};
use orgwarden_organizations::{Organization, OrganizationMember, Role};

pub use memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

/// TTL for cached users.
pub const USER_TTL: Duration = Duration::from_secs(60 * 60);

/// TTL shared by organization-scoped entities (organizations, roles,
/// memberships).
pub const ORG_SCOPED_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache transport error: {0}")]
    Transport(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

/// Raw string key/value backend.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[async_trait]
impl<T> CacheBackend for Arc<T>
where
    T: CacheBackend + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        (**self).delete(key).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed entity caches
// ─────────────────────────────────────────────────────────────────────────────

/// An entity that can live in the cache.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Key namespace.
    const PREFIX: &'static str;
    const TTL: Duration;

    type Key: fmt::Display + Send + Sync;

    fn cache_key(&self) -> Self::Key;
}

/// Composite key for a membership lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.user_id, self.organization_id)
    }
}

impl Cacheable for User {
    const PREFIX: &'static str = "user";
    const TTL: Duration = USER_TTL;
    type Key = UserId;

    fn cache_key(&self) -> UserId {
        self.id
    }
}

impl Cacheable for Organization {
    const PREFIX: &'static str = "organization";
    const TTL: Duration = ORG_SCOPED_TTL;
    type Key = OrganizationId;

    fn cache_key(&self) -> OrganizationId {
        self.id
    }
}

impl Cacheable for Role {
    const PREFIX: &'static str = "role";
    const TTL: Duration = ORG_SCOPED_TTL;
    type Key = RoleId;

    fn cache_key(&self) -> RoleId {
        self.id
    }
}

impl Cacheable for OrganizationMember {
    const PREFIX: &'static str = "member";
    const TTL: Duration = ORG_SCOPED_TTL;
    type Key = MemberKey;

    fn cache_key(&self) -> MemberKey {
        MemberKey {
            user_id: self.user_id,
            organization_id: self.organization_id,
        }
    }
}

/// JSON-over-backend cache for one entity type.
pub struct EntityCache<E> {
    backend: Arc<dyn CacheBackend>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityCache<E> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _entity: PhantomData,
        }
    }
}

impl<E: Cacheable> EntityCache<E> {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            _entity: PhantomData,
        }
    }

    pub fn key(key: &E::Key) -> String {
        format!("{}:{}", E::PREFIX, key)
    }

    pub async fn get(&self, key: &E::Key) -> Result<Option<E>, CacheError> {
        let Some(raw) = self.backend.get(&Self::key(key)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    pub async fn set(&self, entity: &E) -> Result<(), CacheError> {
        let raw = serde_json::to_string(entity).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.backend
            .set_with_ttl(&Self::key(&entity.cache_key()), raw, E::TTL)
            .await
    }

    pub async fn delete(&self, key: &E::Key) -> Result<(), CacheError> {
        self.backend.delete(&Self::key(key)).await
    }
}

impl<E> fmt::Debug for EntityCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("entity", &std::any::type_name::<E>())
            .finish()
    }
}

/// One typed cache per cached entity, all sharing a backend.
#[derive(Debug, Clone)]
pub struct Caches {
    pub users: EntityCache<User>,
    pub organizations: EntityCache<Organization>,
    pub roles: EntityCache<Role>,
    pub members: EntityCache<OrganizationMember>,
}

impl Caches {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            users: EntityCache::new(Arc::clone(&backend)),
            organizations: EntityCache::new(Arc::clone(&backend)),
            roles: EntityCache::new(Arc::clone(&backend)),
            members: EntityCache::new(backend),
        }
    }
}
