//! Organizations domain module (organizations, roles, members, invites).
//!
//! Pure domain logic: entity shapes, validation and state transitions. No IO,
//! no HTTP, no storage. The authorization policy itself lives in
//! `orgwarden-auth`; [`access_facts`] bridges loaded entities to it.

pub mod access;
pub mod invite;
pub mod member;
pub mod organization;
pub mod role;

mod validate;

pub use access::access_facts;
pub use invite::{InviteStatus, OrganizationInvite};
pub use member::OrganizationMember;
pub use organization::{NewOrganization, Organization, OrganizationPatch};
pub use role::{NewRole, Role, RolePatch, SUDO_ROLE_NAME};
