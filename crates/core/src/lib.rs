//! `orgwarden-core`: shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::{Entity, SoftDeletable};
pub use error::{DomainError, DomainResult};
pub use id::{InviteId, MemberId, OrganizationId, ProfileId, RoleId, UserId};
