//! Integration tests for the authorization pipeline.
//!
//! Tests: bearer token → AccessResolver → Directory (cache → store) → policy
//!
//! Verifies:
//! - Deactivated accounts are rejected even with a valid token
//! - Organization availability is checked before permissions
//! - Role deletion is refused while members reference the role
//! - Concurrent updates: exactly one writer wins
//! - Decisions are identical with the cache enabled, disabled, or failing

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;
    use secrecy::SecretString;

    use orgwarden_auth::permissions::{ADD_MEMBER, CREATE_EVENT, DELETE_ORG};
    use orgwarden_auth::{
        AuthzError, GlobalRequirement, NewUser, Permission, PermissionSet, SessionConfig,
        SessionIssuer, User,
    };
    use orgwarden_core::{OrganizationId, UserId};
    use orgwarden_organizations::{
        NewOrganization, NewRole, Organization, OrganizationMember, Role,
    };

    use crate::access::{AccessError, AccessResolver};
    use crate::cache::{CacheBackend, CacheError, Caches, InMemoryCache};
    use crate::directory::{Directory, DirectoryError};
    use crate::store::{InMemoryStore, StoreError, UserStore, Visibility};

    /// Backend whose every call fails, as an unreachable Redis would.
    struct BrokenCache;

    #[async_trait]
    impl CacheBackend for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Transport("connection refused".into()))
        }

        async fn set_with_ttl(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Transport("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Transport("connection refused".into()))
        }
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        directory: Arc<Directory>,
        resolver: AccessResolver,
        sessions: Arc<SessionIssuer>,
    }

    fn harness(cache: Option<Arc<dyn CacheBackend>>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(Directory::new(store.clone(), cache.map(Caches::new)));
        let sessions = Arc::new(SessionIssuer::new(SessionConfig {
            secret: SecretString::from("integration-secret"),
            issuer: "orgwarden".to_string(),
            audience: "orgwarden-api".to_string(),
            ttl: chrono::Duration::hours(1),
            leeway_secs: 0,
        }));
        let resolver = AccessResolver::new(directory.clone(), sessions.clone());
        Harness {
            store,
            directory,
            resolver,
            sessions,
        }
    }

    impl Harness {
        async fn active_user(&self, email: &str) -> User {
            let (mut user, profile) = NewUser::parse(email, "correct horse", "Ada", "Lovelace")
                .unwrap()
                .into_records("not-a-real-hash".to_string(), Utc::now());
            user.is_active = true;
            self.directory.register_user(&user, &profile).await.unwrap();
            user
        }

        async fn organization(&self, founder: &User, name: &str) -> (Organization, Role) {
            let now = Utc::now();
            let org = NewOrganization::parse(name, None, None).unwrap().into_organization(now);
            let sudo = Role::sudo(org.id, now);
            let founding = OrganizationMember::new(org.id, founder.id, sudo.id, now);
            self.directory
                .create_organization(&org, &sudo, &founding)
                .await
                .unwrap();
            (org, sudo)
        }

        async fn role(&self, org: &Organization, name: &str, permissions: &[&str]) -> Role {
            let role = NewRole::parse(name, None, permissions)
                .unwrap()
                .into_role(org.id, Utc::now());
            self.directory.create_role(&role).await.unwrap();
            role
        }

        async fn join(&self, org: &Organization, user: &User, role: &Role) -> OrganizationMember {
            let member = OrganizationMember::new(org.id, user.id, role.id, Utc::now());
            self.directory.add_member(&member).await.unwrap();
            member
        }

        fn token(&self, user_id: UserId) -> String {
            self.sessions.issue(user_id, Utc::now()).unwrap().token
        }

        async fn check(
            &self,
            token: &str,
            org_id: OrganizationId,
            required: &[Permission],
        ) -> Result<(), AccessError> {
            let principal = self
                .resolver
                .resolve_principal(Some(token), Utc::now())
                .await?
                .ok_or(AccessError::Denied(AuthzError::Unauthenticated))?;
            self.resolver
                .authorize_org(&principal, org_id, required)
                .await
                .map(|_| ())
        }

        async fn deactivate_user(&self, id: UserId) {
            let mut user = self.directory.user(id).await.unwrap().unwrap();
            user.deactivate(Utc::now()).unwrap();
            self.directory.update_user(&user).await.unwrap();
        }

        async fn delete_organization(&self, id: OrganizationId) {
            let mut org = self.directory.organization(id).await.unwrap().unwrap();
            org.soft_delete(Utc::now()).unwrap();
            self.directory.update_organization(&org).await.unwrap();
        }
    }

    fn denied(err: AuthzError) -> Result<(), AccessError> {
        Err(AccessError::Denied(err))
    }

    fn every_cache_mode() -> Vec<(&'static str, Option<Arc<dyn CacheBackend>>)> {
        vec![
            ("disabled", None),
            ("in-memory", Some(Arc::new(InMemoryCache::new()) as Arc<dyn CacheBackend>)),
            ("broken", Some(Arc::new(BrokenCache) as Arc<dyn CacheBackend>)),
        ]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Principal resolution
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_token_is_anonymous_and_bad_token_is_rejected() {
        let h = harness(None);
        assert_eq!(h.resolver.resolve_principal(None, Utc::now()).await, Ok(None));
        assert_eq!(
            h.resolver.resolve_principal(Some("garbage"), Utc::now()).await,
            Err(AccessError::Denied(AuthzError::Unauthenticated))
        );
        let unknown = h.token(UserId::new());
        assert_eq!(
            h.resolver.resolve_principal(Some(unknown.as_str()), Utc::now()).await,
            Err(AccessError::Denied(AuthzError::Unauthenticated))
        );
    }

    #[tokio::test]
    async fn unactivated_account_is_rejected() {
        let h = harness(None);
        let (user, profile) = NewUser::parse("new@example.com", "correct horse", "N", "U")
            .unwrap()
            .into_records("hash".to_string(), Utc::now());
        h.directory.register_user(&user, &profile).await.unwrap();

        assert_eq!(
            h.resolver.resolve_principal(Some(h.token(user.id).as_str()), Utc::now()).await,
            Err(AccessError::Denied(AuthzError::AccountNotActivated))
        );
    }

    #[tokio::test]
    async fn deactivated_principal_with_valid_token_is_rejected() {
        for (mode, cache) in every_cache_mode() {
            let h = harness(cache);
            let founder = h.active_user("founder@example.com").await;
            let (org, _) = h.organization(&founder, "Acme").await;
            let token = h.token(founder.id);

            // Warm the cache with the live account.
            assert_eq!(h.check(&token, org.id, &[DELETE_ORG]).await, Ok(()), "{mode}");

            h.deactivate_user(founder.id).await;
            let err = h.check(&token, org.id, &[DELETE_ORG]).await.unwrap_err();
            assert_eq!(err, AccessError::Denied(AuthzError::AccountDeactivated), "{mode}");
            match err {
                AccessError::Denied(e) => assert!(e.is_unauthorized()),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Organization scope
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_event_role_cannot_delete_org() {
        let h = harness(Some(Arc::new(InMemoryCache::new())));
        let founder = h.active_user("founder@example.com").await;
        let planner = h.active_user("planner@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;
        let role = h.role(&org, "Planner", &["create_event"]).await;
        h.join(&org, &planner, &role).await;

        let token = h.token(planner.id);
        assert_eq!(h.check(&token, org.id, &[CREATE_EVENT]).await, Ok(()));
        assert_eq!(
            h.check(&token, org.id, &[DELETE_ORG]).await,
            denied(AuthzError::MissingPermission("delete_org".to_string()))
        );
    }

    #[tokio::test]
    async fn deleted_organization_is_denied_before_permissions() {
        for (mode, cache) in every_cache_mode() {
            let h = harness(cache);
            let founder = h.active_user("founder@example.com").await;
            let (org, _) = h.organization(&founder, "Acme").await;
            let token = h.token(founder.id);
            assert_eq!(h.check(&token, org.id, &[DELETE_ORG]).await, Ok(()), "{mode}");

            h.delete_organization(org.id).await;
            assert_eq!(
                h.check(&token, org.id, &[DELETE_ORG]).await,
                denied(AuthzError::OrganizationUnavailable),
                "{mode}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_organization_and_non_member_are_forbidden() {
        let h = harness(None);
        let founder = h.active_user("founder@example.com").await;
        let outsider = h.active_user("outsider@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;

        let token = h.token(outsider.id);
        assert_eq!(
            h.check(&token, OrganizationId::new(), &[]).await,
            denied(AuthzError::OrganizationUnavailable)
        );
        assert_eq!(h.check(&token, org.id, &[]).await, denied(AuthzError::NotAMember));
    }

    #[tokio::test]
    async fn removed_member_loses_access_immediately() {
        let h = harness(Some(Arc::new(InMemoryCache::new())));
        let founder = h.active_user("founder@example.com").await;
        let planner = h.active_user("planner@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;
        let role = h.role(&org, "Planner", &["create_event"]).await;
        let member = h.join(&org, &planner, &role).await;
        let token = h.token(planner.id);
        assert_eq!(h.check(&token, org.id, &[CREATE_EVENT]).await, Ok(()));

        h.directory.remove_member(member, Utc::now()).await.unwrap();
        assert_eq!(
            h.check(&token, org.id, &[CREATE_EVENT]).await,
            denied(AuthzError::NotAMember)
        );
    }

    #[tokio::test]
    async fn role_permission_change_is_visible_through_the_cache() {
        let h = harness(Some(Arc::new(InMemoryCache::new())));
        let founder = h.active_user("founder@example.com").await;
        let planner = h.active_user("planner@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;
        let mut role = h.role(&org, "Planner", &["create_event"]).await;
        h.join(&org, &planner, &role).await;
        let token = h.token(planner.id);
        assert_eq!(h.check(&token, org.id, &[CREATE_EVENT]).await, Ok(()));

        role.permissions = PermissionSet::from_names(["add_member"]).unwrap();
        h.directory.update_role(&role).await.unwrap();

        assert_eq!(h.check(&token, org.id, &[ADD_MEMBER]).await, Ok(()));
        assert_eq!(
            h.check(&token, org.id, &[CREATE_EVENT]).await,
            denied(AuthzError::MissingPermission("create_event".to_string()))
        );
    }

    #[tokio::test]
    async fn global_role_gate_is_independent_of_membership() {
        let h = harness(None);
        let client = h.active_user("client@example.com").await;
        let principal = h
            .resolver
            .resolve_principal(Some(h.token(client.id).as_str()), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            h.resolver.require_global(&principal, GlobalRequirement::StaffOrAdmin),
            Err(AccessError::Denied(AuthzError::GlobalRoleRequired(
                GlobalRequirement::StaffOrAdmin
            )))
        );
    }

    #[tokio::test]
    async fn explanation_agrees_with_decision() {
        let h = harness(None);
        let founder = h.active_user("founder@example.com").await;
        let planner = h.active_user("planner@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;
        let role = h.role(&org, "Planner", &["create_event"]).await;
        h.join(&org, &planner, &role).await;
        let principal = h
            .resolver
            .resolve_principal(Some(h.token(planner.id).as_str()), Utc::now())
            .await
            .unwrap()
            .unwrap();

        let explanation = h.resolver.explain(&principal, org.id, &[DELETE_ORG]).await.unwrap();
        assert!(!explanation.granted);
        assert_eq!(explanation.role.as_deref(), Some("Planner"));
        assert_eq!(explanation.effective_permissions, vec!["create_event".to_string()]);
        let denial = explanation.denial.unwrap();
        assert_eq!(denial.missing_permissions, vec!["delete_org".to_string()]);

        assert!(h.resolver.explain(&principal, org.id, &[CREATE_EVENT]).await.unwrap().granted);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn role_in_use_cannot_be_deleted() {
        let h = harness(Some(Arc::new(InMemoryCache::new())));
        let founder = h.active_user("founder@example.com").await;
        let planner = h.active_user("planner@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;
        let role = h.role(&org, "Planner", &["create_event"]).await;
        let member = h.join(&org, &planner, &role).await;

        assert_eq!(
            h.directory.delete_role(role.clone(), Utc::now()).await,
            Err(DirectoryError::RoleInUse { members: 1 })
        );
        let stored = h.directory.role(role.id).await.unwrap().unwrap();
        assert!(stored.deleted_at.is_none());

        h.directory.remove_member(member, Utc::now()).await.unwrap();
        let deleted = h.directory.delete_role(stored, Utc::now()).await.unwrap();
        assert!(deleted.deleted_at.is_some());
        assert_eq!(deleted.version, role.version + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn role_delete_racing_a_new_member_never_orphans_the_member() {
        let h = harness(Some(Arc::new(InMemoryCache::new())));
        let founder = h.active_user("founder@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;

        for round in 0..32 {
            let planner = h.active_user(&format!("planner{round}@example.com")).await;
            let role = h.role(&org, &format!("Planner {round}"), &["create_event"]).await;

            let deleter = {
                let directory = Arc::clone(&h.directory);
                let role = role.clone();
                tokio::spawn(async move { directory.delete_role(role, Utc::now()).await })
            };
            let joiner = {
                let directory = Arc::clone(&h.directory);
                let member = OrganizationMember::new(org.id, planner.id, role.id, Utc::now());
                tokio::spawn(async move { directory.add_member(&member).await })
            };
            let deleted = deleter.await.unwrap();
            let joined = joiner.await.unwrap();

            // Exactly one side wins.
            match (&deleted, &joined) {
                (Ok(_), Err(DirectoryError::StaleVersion)) => {}
                (Err(DirectoryError::RoleInUse { members: 1 }), Ok(())) => {}
                other => panic!("round {round}: unexpected outcome {other:?}"),
            }
            let stored = h.directory.role(role.id).await.unwrap().unwrap();
            let member = h.directory.membership(org.id, planner.id).await.unwrap();
            assert_eq!(stored.deleted_at.is_some(), member.is_none(), "round {round}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_organization_updates_have_one_winner() {
        let h = harness(Some(Arc::new(InMemoryCache::new())));
        let founder = h.active_user("founder@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;

        let mut handles = Vec::new();
        for i in 0..2 {
            let directory = h.directory.clone();
            let mut copy = org.clone();
            copy.description = format!("writer {i}");
            handles.push(tokio::spawn(async move { directory.update_organization(&copy).await }));
        }

        let mut wins = 0;
        let mut stale = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(DirectoryError::StaleVersion) => stale += 1,
                Err(other) => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!((wins, stale), (1, 1));

        let stored = h.directory.organization(org.id).await.unwrap().unwrap();
        assert_eq!(stored.version, org.version + 1);
    }

    #[tokio::test]
    async fn duplicate_organization_name_is_rejected_atomically() {
        let h = harness(None);
        let founder = h.active_user("founder@example.com").await;
        h.organization(&founder, "Acme").await;

        let now = Utc::now();
        let org = NewOrganization::parse("Acme", None, None).unwrap().into_organization(now);
        let sudo = Role::sudo(org.id, now);
        let founding = OrganizationMember::new(org.id, founder.id, sudo.id, now);
        assert!(matches!(
            h.directory.create_organization(&org, &sudo, &founding).await,
            Err(DirectoryError::Duplicate(_))
        ));
        assert_eq!(h.directory.role(sudo.id).await, Ok(None));
        assert_eq!(h.directory.organizations_for_user(founder.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cache_is_populated_on_read_and_serves_hits() {
        let backend = Arc::new(InMemoryCache::new());
        let h = harness(Some(backend.clone()));
        let founder = h.active_user("founder@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;
        assert!(backend.is_empty());

        let token = h.token(founder.id);
        assert_eq!(h.check(&token, org.id, &[DELETE_ORG]).await, Ok(()));
        // user, organization, membership, role
        assert_eq!(backend.len(), 4);

        // Writes that bypass the directory are not seen while cached.
        let mut user = h.store.get_user(founder.id, Visibility::Live).await.unwrap().unwrap();
        user.deactivate(Utc::now()).unwrap();
        h.store.update_user(&user).await.unwrap();
        assert_eq!(h.check(&token, org.id, &[DELETE_ORG]).await, Ok(()));
    }

    #[tokio::test]
    async fn store_failure_is_not_an_allow() {
        let err: AccessError = StoreError::Database("down".into()).into();
        assert!(matches!(err, AccessError::Store(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cache equivalence
    // ─────────────────────────────────────────────────────────────────────────

    #[derive(Debug, Clone)]
    enum Op {
        SetPermissions { create_event: bool, delete_org: bool },
        RemoveMember,
        AddMember,
        DeleteRole,
        DeactivateOrganization,
        DeactivateUser,
        Check { create_event: bool, delete_org: bool },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<bool>(), any::<bool>())
                .prop_map(|(create_event, delete_org)| Op::SetPermissions { create_event, delete_org }),
            Just(Op::RemoveMember),
            Just(Op::AddMember),
            Just(Op::DeleteRole),
            Just(Op::DeactivateOrganization),
            Just(Op::DeactivateUser),
            (any::<bool>(), any::<bool>())
                .prop_map(|(create_event, delete_org)| Op::Check { create_event, delete_org }),
            (any::<bool>(), any::<bool>())
                .prop_map(|(create_event, delete_org)| Op::Check { create_event, delete_org }),
        ]
    }

    fn required(create_event: bool, delete_org: bool) -> Vec<Permission> {
        let mut required = Vec::new();
        if create_event {
            required.push(CREATE_EVENT);
        }
        if delete_org {
            required.push(DELETE_ORG);
        }
        required
    }

    /// Run `ops` against a fresh world and record every observable outcome.
    async fn run(cache: Option<Arc<dyn CacheBackend>>, ops: &[Op]) -> Vec<String> {
        let h = harness(cache);
        let founder = h.active_user("founder@example.com").await;
        let planner = h.active_user("planner@example.com").await;
        let (org, _) = h.organization(&founder, "Acme").await;
        let role = h.role(&org, "Planner", &["create_event"]).await;
        h.join(&org, &planner, &role).await;
        let token = h.token(planner.id);

        let mut outcomes = Vec::new();
        for op in ops {
            let outcome = match op {
                Op::SetPermissions { create_event, delete_org } => {
                    let mut current = h.directory.role(role.id).await.unwrap().unwrap();
                    current.permissions = required(*create_event, *delete_org).into_iter().collect();
                    format!("{:?}", h.directory.update_role(&current).await.map(|_| ()))
                }
                Op::RemoveMember => match h.directory.membership(org.id, planner.id).await.unwrap() {
                    Some(member) => {
                        format!("{:?}", h.directory.remove_member(member, Utc::now()).await.map(|_| ()))
                    }
                    None => "no member".to_string(),
                },
                Op::AddMember => match h.directory.membership(org.id, planner.id).await.unwrap() {
                    Some(_) => "already member".to_string(),
                    None => {
                        let member = OrganizationMember::new(org.id, planner.id, role.id, Utc::now());
                        format!("{:?}", h.directory.add_member(&member).await)
                    }
                },
                Op::DeleteRole => {
                    let current = h.directory.role(role.id).await.unwrap().unwrap();
                    format!("{:?}", h.directory.delete_role(current, Utc::now()).await.map(|_| ()))
                }
                Op::DeactivateOrganization => {
                    let mut current = h.directory.organization(org.id).await.unwrap().unwrap();
                    match current.deactivate() {
                        Ok(()) => format!(
                            "{:?}",
                            h.directory.update_organization(&current).await.map(|_| ())
                        ),
                        Err(e) => format!("{e:?}"),
                    }
                }
                Op::DeactivateUser => {
                    let mut current = h.directory.user(planner.id).await.unwrap().unwrap();
                    match current.deactivate(Utc::now()) {
                        Ok(()) => format!("{:?}", h.directory.update_user(&current).await.map(|_| ())),
                        Err(e) => format!("{e:?}"),
                    }
                }
                Op::Check { create_event, delete_org } => {
                    let required = required(*create_event, *delete_org);
                    format!("{:?}", h.check(&token, org.id, &required).await)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn cache_never_changes_decisions(ops in proptest::collection::vec(op(), 1..24)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let uncached = rt.block_on(run(None, &ops));
            let cached = rt.block_on(run(Some(Arc::new(InMemoryCache::new())), &ops));
            let broken = rt.block_on(run(Some(Arc::new(BrokenCache)), &ops));
            prop_assert_eq!(&uncached, &cached);
            prop_assert_eq!(&uncached, &broken);
        }
    }
}
