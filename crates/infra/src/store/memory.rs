use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use orgwarden_auth::{User, UserProfile};
use orgwarden_core::{InviteId, MemberId, OrganizationId, RoleId, UserId};
use orgwarden_organizations::{Organization, OrganizationInvite, OrganizationMember, Role};

use super::{
    InviteStore, MemberStore, OrganizationStore, RoleStore, StoreError, UserStore, Visibility,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    profiles: HashMap<UserId, UserProfile>,
    organizations: HashMap<OrganizationId, Organization>,
    roles: HashMap<RoleId, Role>,
    members: HashMap<MemberId, OrganizationMember>,
    invites: HashMap<InviteId, OrganizationInvite>,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn org_name_taken(&self, name: &str, except: Option<OrganizationId>) -> bool {
        self.organizations
            .values()
            .any(|o| o.name == name && Some(o.id) != except)
    }

    fn role_name_taken(&self, org: OrganizationId, name: &str, except: Option<RoleId>) -> bool {
        self.roles.values().any(|r| {
            r.organization_id == org && r.name == name && r.deleted_at.is_none() && Some(r.id) != except
        })
    }

    fn role_is_live(&self, role: RoleId) -> bool {
        self.roles.get(&role).is_some_and(|r| r.deleted_at.is_none())
    }

    fn live_members_for_role(&self, role: RoleId) -> u64 {
        self.members
            .values()
            .filter(|m| m.role_id == role && m.deleted_at.is_none())
            .count() as u64
    }

    fn live_binding_exists(&self, org: OrganizationId, user: UserId, except: Option<MemberId>) -> bool {
        self.members.values().any(|m| {
            m.organization_id == org && m.user_id == user && m.deleted_at.is_none() && Some(m.id) != except
        })
    }
}

/// In-memory store for tests/dev.
///
/// Every table sits behind one lock, so multi-row writes are atomic and a
/// version check and its write can never interleave with another writer.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".to_string()))
    }
}

/// Optimistic write: the stored row must still be at `version`.
fn bump<T: Clone>(
    slot: Option<&mut T>,
    expected: i64,
    version_of: impl Fn(&T) -> i64,
    next: &T,
    stamp: impl FnOnce(&mut T),
) -> Result<T, StoreError> {
    let Some(current) = slot else {
        return Err(StoreError::NotFound);
    };
    if version_of(current) != expected {
        return Err(StoreError::NotFound);
    }
    *current = next.clone();
    stamp(current);
    Ok(current.clone())
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, user: &User, profile: &UserProfile) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if t.email_taken(&user.email, None) {
            return Err(StoreError::Duplicate(format!("email '{}' already registered", user.email)));
        }
        t.users.insert(user.id, user.clone());
        t.profiles.insert(user.id, profile.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId, visibility: Visibility) -> Result<Option<User>, StoreError> {
        let t = self.read()?;
        Ok(t.users.get(&id).filter(|u| visibility.admits(u.deleted_at)).cloned())
    }

    async fn find_user_by_email(
        &self,
        email: &str,
        visibility: Visibility,
    ) -> Result<Option<User>, StoreError> {
        let t = self.read()?;
        Ok(t.users
            .values()
            .find(|u| u.email == email && visibility.admits(u.deleted_at))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut t = self.write()?;
        if t.email_taken(&user.email, Some(user.id)) {
            return Err(StoreError::Duplicate(format!("email '{}' already registered", user.email)));
        }
        bump(t.users.get_mut(&user.id), user.version, |u| u.version, user, |u| {
            u.version += 1;
            u.updated_at = Utc::now();
        })
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        let t = self.read()?;
        Ok(t.profiles.get(&user_id).filter(|p| p.deleted_at.is_none()).cloned())
    }
}

#[async_trait]
impl OrganizationStore for InMemoryStore {
    async fn create_organization(
        &self,
        organization: &Organization,
        sudo_role: &Role,
        founder: &OrganizationMember,
    ) -> Result<(), StoreError> {
        let mut t = self.write()?;
        // All checks happen before the first insert, so a failure leaves
        // nothing behind.
        if t.org_name_taken(&organization.name, None) {
            return Err(StoreError::Duplicate(format!(
                "organization '{}' already exists",
                organization.name
            )));
        }
        if t.organizations.contains_key(&organization.id) || t.roles.contains_key(&sudo_role.id) {
            return Err(StoreError::Duplicate("identifier already in use".to_string()));
        }
        t.organizations.insert(organization.id, organization.clone());
        t.roles.insert(sudo_role.id, sudo_role.clone());
        t.members.insert(founder.id, founder.clone());
        Ok(())
    }

    async fn get_organization(
        &self,
        id: OrganizationId,
        visibility: Visibility,
    ) -> Result<Option<Organization>, StoreError> {
        let t = self.read()?;
        Ok(t.organizations
            .get(&id)
            .filter(|o| visibility.admits(o.deleted_at))
            .cloned())
    }

    async fn find_organization_by_name(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> Result<Option<Organization>, StoreError> {
        let t = self.read()?;
        Ok(t.organizations
            .values()
            .find(|o| o.name == name && visibility.admits(o.deleted_at))
            .cloned())
    }

    async fn update_organization(&self, organization: &Organization) -> Result<Organization, StoreError> {
        let mut t = self.write()?;
        if t.org_name_taken(&organization.name, Some(organization.id)) {
            return Err(StoreError::Duplicate(format!(
                "organization '{}' already exists",
                organization.name
            )));
        }
        bump(
            t.organizations.get_mut(&organization.id),
            organization.version,
            |o| o.version,
            organization,
            |o| {
                o.version += 1;
                o.updated_at = Utc::now();
            },
        )
    }

    async fn list_organizations_for_user(&self, user_id: UserId) -> Result<Vec<Organization>, StoreError> {
        let t = self.read()?;
        let mut orgs: Vec<Organization> = t
            .members
            .values()
            .filter(|m| m.user_id == user_id && m.deleted_at.is_none())
            .filter_map(|m| t.organizations.get(&m.organization_id))
            .filter(|o| o.deleted_at.is_none())
            .cloned()
            .collect();
        orgs.sort_by_key(|o| (o.created_at, o.id));
        orgs.dedup_by_key(|o| o.id);
        Ok(orgs)
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn create_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if t.role_name_taken(role.organization_id, &role.name, None) {
            return Err(StoreError::Duplicate(format!("role '{}' already exists", role.name)));
        }
        t.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn get_role(&self, id: RoleId, visibility: Visibility) -> Result<Option<Role>, StoreError> {
        let t = self.read()?;
        Ok(t.roles.get(&id).filter(|r| visibility.admits(r.deleted_at)).cloned())
    }

    async fn find_role_by_name(
        &self,
        organization_id: OrganizationId,
        name: &str,
        visibility: Visibility,
    ) -> Result<Option<Role>, StoreError> {
        let t = self.read()?;
        Ok(t.roles
            .values()
            .find(|r| r.organization_id == organization_id && r.name == name && visibility.admits(r.deleted_at))
            .cloned())
    }

    async fn list_roles(
        &self,
        organization_id: OrganizationId,
        visibility: Visibility,
    ) -> Result<Vec<Role>, StoreError> {
        let t = self.read()?;
        let mut roles: Vec<Role> = t
            .roles
            .values()
            .filter(|r| r.organization_id == organization_id && visibility.admits(r.deleted_at))
            .cloned()
            .collect();
        roles.sort_by_key(|r| (r.created_at, r.id));
        Ok(roles)
    }

    async fn update_role(&self, role: &Role) -> Result<Role, StoreError> {
        let mut t = self.write()?;
        if role.deleted_at.is_none() && t.role_name_taken(role.organization_id, &role.name, Some(role.id)) {
            return Err(StoreError::Duplicate(format!("role '{}' already exists", role.name)));
        }
        bump(t.roles.get_mut(&role.id), role.version, |r| r.version, role, |r| {
            r.version += 1;
            r.updated_at = Utc::now();
        })
    }

    async fn delete_role(&self, role: &Role) -> Result<Role, StoreError> {
        let mut t = self.write()?;
        let members = t.live_members_for_role(role.id);
        if members > 0 {
            return Err(StoreError::RoleInUse { members });
        }
        bump(t.roles.get_mut(&role.id), role.version, |r| r.version, role, |r| {
            r.version += 1;
            r.updated_at = Utc::now();
        })
    }
}

#[async_trait]
impl MemberStore for InMemoryStore {
    async fn create_member(&self, member: &OrganizationMember) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if !t.role_is_live(member.role_id) {
            return Err(StoreError::NotFound);
        }
        if t.live_binding_exists(member.organization_id, member.user_id, None) {
            return Err(StoreError::Duplicate("user is already a member".to_string()));
        }
        t.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn get_member(
        &self,
        id: MemberId,
        visibility: Visibility,
    ) -> Result<Option<OrganizationMember>, StoreError> {
        let t = self.read()?;
        Ok(t.members.get(&id).filter(|m| visibility.admits(m.deleted_at)).cloned())
    }

    async fn find_member(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        visibility: Visibility,
    ) -> Result<Option<OrganizationMember>, StoreError> {
        let t = self.read()?;
        // A user may have several removed bindings but at most one live one;
        // prefer the live one, then the most recent.
        Ok(t.members
            .values()
            .filter(|m| {
                m.organization_id == organization_id && m.user_id == user_id && visibility.admits(m.deleted_at)
            })
            .max_by_key(|m| (m.deleted_at.is_none(), m.created_at))
            .cloned())
    }

    async fn list_members(
        &self,
        organization_id: OrganizationId,
        visibility: Visibility,
    ) -> Result<Vec<OrganizationMember>, StoreError> {
        let t = self.read()?;
        let mut members: Vec<OrganizationMember> = t
            .members
            .values()
            .filter(|m| m.organization_id == organization_id && visibility.admits(m.deleted_at))
            .cloned()
            .collect();
        members.sort_by_key(|m| (m.created_at, m.id));
        Ok(members)
    }

    async fn update_member(&self, member: &OrganizationMember) -> Result<OrganizationMember, StoreError> {
        let mut t = self.write()?;
        if member.deleted_at.is_none() {
            if !t.role_is_live(member.role_id) {
                return Err(StoreError::NotFound);
            }
            if t.live_binding_exists(member.organization_id, member.user_id, Some(member.id)) {
                return Err(StoreError::Duplicate("user is already a member".to_string()));
            }
        }
        bump(t.members.get_mut(&member.id), member.version, |m| m.version, member, |m| {
            m.version += 1;
            m.updated_at = Utc::now();
        })
    }
}

#[async_trait]
impl InviteStore for InMemoryStore {
    async fn create_invite(&self, invite: &OrganizationInvite) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if t.invites.contains_key(&invite.id) {
            return Err(StoreError::Duplicate("invite already exists".to_string()));
        }
        t.invites.insert(invite.id, invite.clone());
        Ok(())
    }

    async fn get_invite(
        &self,
        id: InviteId,
        visibility: Visibility,
    ) -> Result<Option<OrganizationInvite>, StoreError> {
        let t = self.read()?;
        Ok(t.invites.get(&id).filter(|i| visibility.admits(i.deleted_at)).cloned())
    }
}
