use serde::Serialize;
use thiserror::Error;

use crate::{GlobalRole, Permission, PermissionSet, Principal};

/// Global-role gate, orthogonal to organization permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRequirement {
    Admin,
    StaffOrAdmin,
}

impl GlobalRequirement {
    pub fn is_met_by(self, role: GlobalRole) -> bool {
        match self {
            GlobalRequirement::Admin => role.is_admin(),
            GlobalRequirement::StaffOrAdmin => role.is_staff_or_admin(),
        }
    }
}

impl core::fmt::Display for GlobalRequirement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            GlobalRequirement::Admin => f.write_str("admin"),
            GlobalRequirement::StaffOrAdmin => f.write_str("staff or admin"),
        }
    }
}

/// Request authorization stage at which a check failed.
///
/// `Unauthenticated → Authenticated → Live → OrgScoped → Authorized`; every
/// failed transition is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStage {
    /// Token or account state. Surfaces as 401.
    Authentication,
    /// Organization missing, inactive or deleted. Surfaces as 403.
    Organization,
    /// Membership, role or permission. Surfaces as 403.
    Permission,
    /// Global role gate. Surfaces as 403.
    GlobalRole,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("account has not been activated")]
    AccountNotActivated,

    #[error("account has been deactivated")]
    AccountDeactivated,

    #[error("organization is not available")]
    OrganizationUnavailable,

    #[error("not a member of this organization")]
    NotAMember,

    #[error("role is not available")]
    RoleUnavailable,

    #[error("forbidden: missing permission '{0}'")]
    MissingPermission(String),

    #[error("forbidden: requires global role {0}")]
    GlobalRoleRequired(GlobalRequirement),
}

impl AuthzError {
    pub fn stage(&self) -> AuthStage {
        match self {
            AuthzError::Unauthenticated
            | AuthzError::AccountNotActivated
            | AuthzError::AccountDeactivated => AuthStage::Authentication,
            AuthzError::OrganizationUnavailable => AuthStage::Organization,
            AuthzError::NotAMember | AuthzError::RoleUnavailable | AuthzError::MissingPermission(_) => {
                AuthStage::Permission
            }
            AuthzError::GlobalRoleRequired(_) => AuthStage::GlobalRole,
        }
    }

    /// 401 class (identity/account) as opposed to 403 class.
    pub fn is_unauthorized(&self) -> bool {
        self.stage() == AuthStage::Authentication
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Organization-scoped policy
// ─────────────────────────────────────────────────────────────────────────────

/// What the store knows about one principal's standing in one organization.
///
/// Built from loaded entities by the caller; this module never does IO.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrgAccess {
    /// Organization exists, is active and not soft-deleted.
    pub organization_available: bool,
    /// The principal's live membership, if any.
    pub grant: Option<RoleGrant>,
}

/// The role a membership points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role_name: String,
    /// Soft-deleted, missing, or belonging to another organization.
    pub role_unavailable: bool,
    pub permissions: PermissionSet,
}

/// Authorize a principal against an organization.
///
/// - No IO
/// - No panics
/// - Checks run in a fixed order and the first failure wins: account
///   liveness, organization availability, membership, role, permissions.
pub fn authorize(
    principal: &Principal,
    access: &OrgAccess,
    required: &[Permission],
) -> Result<(), AuthzError> {
    principal.ensure_live()?;

    if !access.organization_available {
        return Err(AuthzError::OrganizationUnavailable);
    }

    let grant = access.grant.as_ref().ok_or(AuthzError::NotAMember)?;
    if grant.role_unavailable {
        return Err(AuthzError::RoleUnavailable);
    }

    match grant.permissions.missing(required).first() {
        Some(missing) => Err(AuthzError::MissingPermission(missing.to_string())),
        None => Ok(()),
    }
}

/// Global-role gate. Liveness is checked first, as for org-scoped routes.
pub fn require_global_role(
    principal: &Principal,
    requirement: GlobalRequirement,
) -> Result<(), AuthzError> {
    principal.ensure_live()?;
    if requirement.is_met_by(principal.role) {
        Ok(())
    } else {
        Err(AuthzError::GlobalRoleRequired(requirement))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Debuggable account of an authorization decision ("why was I denied?").
///
/// Always agrees with [`authorize`] on `granted`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permissions: Vec<String>,
    pub granted: bool,
    pub reason: String,
    pub role: Option<String>,
    pub effective_permissions: Vec<String>,
    pub denial: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub stage: AuthStage,
    pub error: String,
    pub missing_permissions: Vec<String>,
    pub suggestions: Vec<String>,
}

pub fn explain_authorization(
    principal: &Principal,
    access: &OrgAccess,
    required: &[Permission],
) -> AuthorizationExplanation {
    let required_permissions: Vec<String> = required.iter().map(|p| p.as_str().to_string()).collect();
    let role = access.grant.as_ref().map(|g| g.role_name.clone());
    let effective_permissions = match &access.grant {
        Some(grant) if !grant.role_unavailable => grant.permissions.to_names(),
        _ => Vec::new(),
    };

    let err = match authorize(principal, access, required) {
        Ok(()) => {
            return AuthorizationExplanation {
                reason: format!(
                    "Role '{}' grants {:?}",
                    role.as_deref().unwrap_or_default(),
                    required_permissions
                ),
                required_permissions,
                granted: true,
                role,
                effective_permissions,
                denial: None,
            };
        }
        Err(err) => err,
    };

    let missing_permissions: Vec<String> = match &access.grant {
        Some(grant) if !grant.role_unavailable => grant
            .permissions
            .missing(required)
            .into_iter()
            .map(|p| p.as_str().to_string())
            .collect(),
        _ => required_permissions.clone(),
    };

    let suggestions = match &err {
        AuthzError::Unauthenticated => vec!["Sign in and retry with a valid session token".to_string()],
        AuthzError::AccountNotActivated => {
            vec!["Activate the account using the link sent by email".to_string()]
        }
        AuthzError::AccountDeactivated => vec!["Contact staff to restore the account".to_string()],
        AuthzError::OrganizationUnavailable => {
            vec!["Check that the organization id is correct and the organization is active".to_string()]
        }
        AuthzError::NotAMember => {
            vec!["Ask an organization member with 'add_member' to add you".to_string()]
        }
        AuthzError::RoleUnavailable => {
            vec!["Ask a member with 'update_member' to assign you an existing role".to_string()]
        }
        AuthzError::MissingPermission(_) => missing_permissions
            .iter()
            .map(|p| format!("Assign a role that grants the '{p}' permission"))
            .collect(),
        AuthzError::GlobalRoleRequired(_) => Vec::new(),
    };

    AuthorizationExplanation {
        reason: format!("Denied at {:?} stage: {err}", err.stage()),
        required_permissions,
        granted: false,
        role,
        effective_permissions,
        denial: Some(DenialReason {
            stage: err.stage(),
            error: err.to_string(),
            missing_permissions,
            suggestions,
        }),
    }
}

#[cfg(test)]
mod tests {
    use orgwarden_core::UserId;
    use proptest::prelude::*;

    use super::*;
    use crate::permissions::{CREATE_EVENT, DELETE_ORG, UPDATE_ORG};
    use crate::AccountState;

    fn principal(account: AccountState, role: GlobalRole) -> Principal {
        Principal {
            id: UserId::new(),
            email: "p@example.com".to_string(),
            role,
            account,
        }
    }

    fn live() -> Principal {
        principal(AccountState::Active, GlobalRole::Client)
    }

    fn access(perms: &[&str]) -> OrgAccess {
        OrgAccess {
            organization_available: true,
            grant: Some(RoleGrant {
                role_name: "editor".to_string(),
                role_unavailable: false,
                permissions: PermissionSet::from_names(perms).unwrap(),
            }),
        }
    }

    #[test]
    fn grants_when_role_holds_permission() {
        assert_eq!(authorize(&live(), &access(&["create_event"]), &[CREATE_EVENT]), Ok(()));
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let err = authorize(&live(), &access(&["create_event"]), &[DELETE_ORG]).unwrap_err();
        assert_eq!(err, AuthzError::MissingPermission("delete_org".to_string()));
        assert_eq!(err.stage(), AuthStage::Permission);
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn every_required_permission_must_be_held() {
        let err = authorize(&live(), &access(&["update_org"]), &[UPDATE_ORG, DELETE_ORG]).unwrap_err();
        assert_eq!(err, AuthzError::MissingPermission("delete_org".to_string()));
    }

    #[test]
    fn account_state_checked_before_everything() {
        let denied = OrgAccess::default();
        let err = authorize(&principal(AccountState::Deactivated, GlobalRole::Admin), &denied, &[])
            .unwrap_err();
        assert_eq!(err, AuthzError::AccountDeactivated);
        assert!(err.is_unauthorized());

        let err = authorize(&principal(AccountState::NotActivated, GlobalRole::Client), &denied, &[])
            .unwrap_err();
        assert_eq!(err, AuthzError::AccountNotActivated);
    }

    #[test]
    fn organization_checked_before_permissions() {
        let mut facts = access(&["delete_org"]);
        facts.organization_available = false;
        let err = authorize(&live(), &facts, &[DELETE_ORG]).unwrap_err();
        assert_eq!(err, AuthzError::OrganizationUnavailable);
        assert_eq!(err.stage(), AuthStage::Organization);
    }

    #[test]
    fn membership_and_role_required() {
        let no_member = OrgAccess {
            organization_available: true,
            grant: None,
        };
        assert_eq!(authorize(&live(), &no_member, &[]), Err(AuthzError::NotAMember));

        let mut deleted_role = access(&["create_event"]);
        if let Some(grant) = deleted_role.grant.as_mut() {
            grant.role_unavailable = true;
        }
        assert_eq!(
            authorize(&live(), &deleted_role, &[CREATE_EVENT]),
            Err(AuthzError::RoleUnavailable)
        );
    }

    #[test]
    fn global_role_gates() {
        let staff = principal(AccountState::Active, GlobalRole::Staff);
        let admin = principal(AccountState::Active, GlobalRole::Admin);

        assert!(require_global_role(&staff, GlobalRequirement::StaffOrAdmin).is_ok());
        assert!(require_global_role(&admin, GlobalRequirement::StaffOrAdmin).is_ok());
        assert!(require_global_role(&admin, GlobalRequirement::Admin).is_ok());

        let err = require_global_role(&staff, GlobalRequirement::Admin).unwrap_err();
        assert_eq!(err.stage(), AuthStage::GlobalRole);
        assert_eq!(
            require_global_role(&live(), GlobalRequirement::StaffOrAdmin),
            Err(AuthzError::GlobalRoleRequired(GlobalRequirement::StaffOrAdmin))
        );

        let deactivated_admin = principal(AccountState::Deactivated, GlobalRole::Admin);
        assert_eq!(
            require_global_role(&deactivated_admin, GlobalRequirement::Admin),
            Err(AuthzError::AccountDeactivated)
        );
    }

    #[test]
    fn explanation_lists_missing_permissions() {
        let explanation =
            explain_authorization(&live(), &access(&["create_event"]), &[CREATE_EVENT, DELETE_ORG]);
        assert!(!explanation.granted);
        assert_eq!(explanation.role.as_deref(), Some("editor"));
        assert_eq!(explanation.effective_permissions, vec!["create_event"]);
        let denial = explanation.denial.unwrap();
        assert_eq!(denial.stage, AuthStage::Permission);
        assert_eq!(denial.missing_permissions, vec!["delete_org"]);
        assert_eq!(denial.suggestions.len(), 1);
    }

    #[test]
    fn explanation_for_grant_has_no_denial() {
        let explanation = explain_authorization(&live(), &access(&["update_org"]), &[UPDATE_ORG]);
        assert!(explanation.granted);
        assert!(explanation.denial.is_none());
    }

    fn catalog_names() -> Vec<&'static str> {
        crate::catalog()
            .into_iter()
            .flat_map(|g| g.permissions)
            .collect()
    }

    fn account_state() -> impl Strategy<Value = AccountState> {
        prop_oneof![
            Just(AccountState::Active),
            Just(AccountState::NotActivated),
            Just(AccountState::Deactivated),
        ]
    }

    proptest! {
        #[test]
        fn authorize_is_the_conjunction_of_its_facts(
            account in account_state(),
            org_available in any::<bool>(),
            is_member in any::<bool>(),
            role_unavailable in any::<bool>(),
            held in proptest::sample::subsequence(catalog_names(), 0..=11),
            required in proptest::sample::subsequence(catalog_names(), 0..=3),
        ) {
            let facts = OrgAccess {
                organization_available: org_available,
                grant: is_member.then(|| RoleGrant {
                    role_name: "r".to_string(),
                    role_unavailable,
                    permissions: PermissionSet::from_names(&held).unwrap(),
                }),
            };
            let required: Vec<Permission> =
                required.iter().map(|name| Permission::parse(name).unwrap()).collect();
            let p = principal(account, GlobalRole::Client);

            let expected = account == AccountState::Active
                && org_available
                && is_member
                && !role_unavailable
                && required.iter().all(|r| held.iter().any(|h| *h == r.as_str()));

            let decision = authorize(&p, &facts, &required);
            prop_assert_eq!(decision.is_ok(), expected);
            if let Err(err) = &decision {
                prop_assert_eq!(err.is_unauthorized(), account != AccountState::Active);
            }
            prop_assert_eq!(explain_authorization(&p, &facts, &required).granted, expected);
        }
    }
}
