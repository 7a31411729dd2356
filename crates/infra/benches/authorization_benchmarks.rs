use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use orgwarden_auth::permissions::{CREATE_EVENT, DELETE_ORG, UPDATE_ORG};
use orgwarden_auth::{
    authorize, AccountState, GlobalRole, NewUser, OrgAccess, Permission, PermissionSet, Principal,
    RoleGrant, SessionConfig, SessionIssuer,
};
use orgwarden_core::UserId;
use orgwarden_infra::cache::{CacheBackend, Caches, InMemoryCache};
use orgwarden_infra::{AccessResolver, Directory, InMemoryStore};
use orgwarden_organizations::{NewOrganization, OrganizationMember, Role};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn principal() -> Principal {
    Principal {
        id: UserId::new(),
        email: "bench@example.com".to_string(),
        role: GlobalRole::Client,
        account: AccountState::Active,
    }
}

fn access(permissions: PermissionSet) -> OrgAccess {
    OrgAccess {
        organization_available: true,
        grant: Some(RoleGrant {
            role_name: "bench".to_string(),
            role_unavailable: false,
            permissions,
        }),
    }
}

/// Pure policy: no IO, just the ordered checks and the subset test.
fn bench_policy(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy");
    let principal = principal();

    let sets: [(&str, PermissionSet); 3] = [
        ("empty_role", PermissionSet::new()),
        ("single_permission", [CREATE_EVENT].into_iter().collect()),
        ("sudo", PermissionSet::all()),
    ];

    for (name, set) in sets {
        let facts = access(set);
        for required in [vec![CREATE_EVENT], vec![CREATE_EVENT, UPDATE_ORG, DELETE_ORG]] {
            group.throughput(Throughput::Elements(required.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(name, required.len()),
                &required,
                |b, required: &Vec<Permission>| {
                    b.iter(|| black_box(authorize(&principal, &facts, black_box(required))));
                },
            );
        }
    }

    group.finish();
}

struct World {
    resolver: AccessResolver,
    token: String,
    org_id: orgwarden_core::OrganizationId,
}

fn world(rt: &Runtime, cache: Option<Arc<dyn CacheBackend>>) -> World {
    rt.block_on(async {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(Directory::new(store, cache.map(Caches::new)));
        let sessions = Arc::new(SessionIssuer::new(SessionConfig {
            secret: SecretString::from("bench-secret"),
            issuer: "orgwarden".to_string(),
            audience: "orgwarden-api".to_string(),
            ttl: chrono::Duration::hours(1),
            leeway_secs: 0,
        }));

        let now = Utc::now();
        let (mut user, profile) = NewUser::parse("bench@example.com", "correct horse", "B", "M")
            .unwrap()
            .into_records("hash".to_string(), now);
        user.is_active = true;
        directory.register_user(&user, &profile).await.unwrap();

        let org = NewOrganization::parse("Bench", None, None).unwrap().into_organization(now);
        let sudo = Role::sudo(org.id, now);
        let founder = OrganizationMember::new(org.id, user.id, sudo.id, now);
        directory.create_organization(&org, &sudo, &founder).await.unwrap();

        World {
            resolver: AccessResolver::new(directory, sessions.clone()),
            token: sessions.issue(user.id, now).unwrap().token,
            org_id: org.id,
        }
    })
}

/// Full resolution: token verification, four lookups, policy.
fn bench_resolver(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("resolver");

    let worlds = [
        ("store_only", world(&rt, None)),
        ("in_memory_cache", world(&rt, Some(Arc::new(InMemoryCache::new())))),
    ];

    for (name, w) in &worlds {
        group.bench_function(*name, |b| {
            b.iter(|| {
                rt.block_on(async {
                    let principal = w
                        .resolver
                        .resolve_principal(Some(w.token.as_str()), Utc::now())
                        .await
                        .unwrap()
                        .unwrap();
                    black_box(
                        w.resolver
                            .authorize_org(&principal, w.org_id, &[DELETE_ORG])
                            .await
                            .unwrap(),
                    )
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_policy, bench_resolver);
criterion_main!(benches);
