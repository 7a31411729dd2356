//! `orgwarden-auth`: authentication and authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: token issuance
//! and verification, credentials, the permission catalog and the pure
//! authorization policy all take their inputs as plain values.

pub mod action;
pub mod authorize;
pub mod claims;
pub mod credentials;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod session;
pub mod user;

pub use action::{ActionPurpose, ActionTokenCipher, ActionTokenError};
pub use authorize::{
    authorize, explain_authorization, require_global_role, AuthStage, AuthorizationExplanation,
    AuthzError, DenialReason, GlobalRequirement, OrgAccess, RoleGrant,
};
pub use claims::{validate_claims, SessionClaims, TokenValidationError};
pub use credentials::{check_login, CredentialError, PasswordHasher};
pub use permissions::{catalog, CatalogGroup, Permission, PermissionCategory, PermissionSet, UnknownPermission};
pub use principal::{AccountState, Principal};
pub use roles::GlobalRole;
pub use session::{SessionConfig, SessionIssuer, SessionVerifier, SignedToken, TokenError};
pub use user::{normalize_email, validate_password, NewUser, User, UserProfile};
