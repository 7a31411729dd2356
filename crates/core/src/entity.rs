//! Entity traits: identity, optimistic versioning and soft deletion.

use chrono::{DateTime, Utc};

/// A persisted entity with a stable identity and an optimistic-concurrency
/// version counter.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;

    /// Version the entity was loaded at.
    ///
    /// Every successful update is conditioned on this value and increments it
    /// by exactly one.
    fn version(&self) -> i64;
}

/// Entities that are never hard-deleted; removal stamps `deleted_at`.
pub trait SoftDeletable {
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}
