//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | any other | `Database` |
//! | Decode / ColumnNotFound | N/A | `Database` |
//! | PoolClosed, IO, TLS, ... | N/A | `Database` |
//!
//! A conditional `UPDATE … WHERE id = $1 AND version = $2` that touches no
//! row is `NotFound`: the row is gone or another writer got there first.
//!
//! ## Thread Safety
//!
//! `PostgresStore` is `Send + Sync`; all access goes through the SQLx pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use orgwarden_auth::{GlobalRole, PermissionSet, User, UserProfile};
use orgwarden_core::{InviteId, MemberId, OrganizationId, ProfileId, RoleId, UserId};
use orgwarden_organizations::{Organization, OrganizationInvite, OrganizationMember, Role};

use super::{
    InviteStore, MemberStore, OrganizationStore, RoleStore, StoreError, UserStore, Visibility,
};

const USER_COLUMNS: &str =
    "id, email, password_hash, role, is_active, version, created_at, updated_at, deleted_at";
const PROFILE_COLUMNS: &str =
    "id, user_id, first_name, last_name, version, created_at, updated_at, deleted_at";
const ORG_COLUMNS: &str =
    "id, name, description, profile_pic, is_active, version, created_at, updated_at, deleted_at";
const ROLE_COLUMNS: &str =
    "id, organization_id, name, description, permissions, version, created_at, updated_at, deleted_at";
const MEMBER_COLUMNS: &str =
    "id, organization_id, user_id, role_id, version, created_at, updated_at, deleted_at";
const INVITE_COLUMNS: &str = "id, organization_id, email, role_id, invited_by, accepted_at, declined_at, \
     version, created_at, updated_at, deleted_at";

/// SQL fragment for a visibility filter on an unaliased table.
fn live_clause(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Live => " AND deleted_at IS NULL",
        Visibility::IncludeDeleted => "",
    }
}

/// Pool sizing, taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a bounded pool and bring the schema up to date.
    pub async fn connect(url: &str, settings: PoolSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        super::schema::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_user(&self, sql: &str, bind: impl AsRef<str> + Send) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(sql)
            .bind(bind.as_ref())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_user", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_user", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self, user, profile), fields(user_id = %user.id), err)]
    async fn create_user(&self, user: &User, profile: &UserProfile) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, role, is_active, version, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.version)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        sqlx::query(
            r#"
            INSERT INTO user_profiles (id, user_id, first_name, last_name, version, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(profile.id.as_uuid())
        .bind(profile.user_id.as_uuid())
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.version)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .bind(profile.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_profile", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get_user(&self, id: UserId, visibility: Visibility) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1{}",
            live_clause(visibility)
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_user", e))
    }

    #[instrument(skip(self, email), err)]
    async fn find_user_by_email(
        &self,
        email: &str,
        visibility: Visibility,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1{}",
            live_clause(visibility)
        );
        self.fetch_user(&sql, email).await
    }

    #[instrument(skip(self, user), fields(user_id = %user.id, version = user.version), err)]
    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
            SET email = $3, password_hash = $4, role = $5, is_active = $6, deleted_at = $7,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(user.id.as_uuid())
            .bind(user.version)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(user.deleted_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?
            .ok_or(StoreError::NotFound)?;
        user_from_row(&row).map_err(|e| map_sqlx_error("decode_user", e))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_profile", e))?;
        row.as_ref()
            .map(profile_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_profile", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Organizations
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl OrganizationStore for PostgresStore {
    /// Organization, sudo role and founding member in one transaction; any
    /// failure rolls the whole thing back (the transaction is dropped
    /// uncommitted).
    #[instrument(
        skip(self, organization, sudo_role, founder),
        fields(organization_id = %organization.id, founder = %founder.user_id),
        err
    )]
    async fn create_organization(
        &self,
        organization: &Organization,
        sudo_role: &Role,
        founder: &OrganizationMember,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, description, profile_pic, is_active, version, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(organization.id.as_uuid())
        .bind(&organization.name)
        .bind(&organization.description)
        .bind(&organization.profile_pic)
        .bind(organization.is_active)
        .bind(organization.version)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .bind(organization.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_organization", e))?;

        insert_role(&mut tx, sudo_role).await?;
        insert_member(&mut tx, founder).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(organization_id = %id), err)]
    async fn get_organization(
        &self,
        id: OrganizationId,
        visibility: Visibility,
    ) -> Result<Option<Organization>, StoreError> {
        let sql = format!(
            "SELECT {ORG_COLUMNS} FROM organizations WHERE id = $1{}",
            live_clause(visibility)
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_organization", e))?;
        row.as_ref()
            .map(organization_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_organization", e))
    }

    #[instrument(skip(self), err)]
    async fn find_organization_by_name(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> Result<Option<Organization>, StoreError> {
        let sql = format!(
            "SELECT {ORG_COLUMNS} FROM organizations WHERE name = $1{}",
            live_clause(visibility)
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_organization_by_name", e))?;
        row.as_ref()
            .map(organization_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_organization", e))
    }

    #[instrument(
        skip(self, organization),
        fields(organization_id = %organization.id, version = organization.version),
        err
    )]
    async fn update_organization(&self, organization: &Organization) -> Result<Organization, StoreError> {
        let sql = format!(
            r#"
            UPDATE organizations
            SET name = $3, description = $4, profile_pic = $5, is_active = $6, deleted_at = $7,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {ORG_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(organization.id.as_uuid())
            .bind(organization.version)
            .bind(&organization.name)
            .bind(&organization.description)
            .bind(&organization.profile_pic)
            .bind(organization.is_active)
            .bind(organization.deleted_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_organization", e))?
            .ok_or(StoreError::NotFound)?;
        organization_from_row(&row).map_err(|e| map_sqlx_error("decode_organization", e))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_organizations_for_user(&self, user_id: UserId) -> Result<Vec<Organization>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT o.id, o.name, o.description, o.profile_pic, o.is_active, o.version,
                   o.created_at, o.updated_at, o.deleted_at
            FROM organizations o
            JOIN organization_members m ON m.organization_id = o.id
            WHERE m.user_id = $1 AND m.deleted_at IS NULL AND o.deleted_at IS NULL
            ORDER BY o.created_at ASC, o.id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_organizations_for_user", e))?;

        rows.iter()
            .map(organization_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_organization", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

async fn insert_role(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, role: &Role) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO roles (id, organization_id, name, description, permissions, version, created_at, updated_at, deleted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(role.id.as_uuid())
    .bind(role.organization_id.as_uuid())
    .bind(&role.name)
    .bind(&role.description)
    .bind(role.permissions.to_names())
    .bind(role.version)
    .bind(role.created_at)
    .bind(role.updated_at)
    .bind(role.deleted_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_role", e))?;
    Ok(())
}

#[async_trait]
impl RoleStore for PostgresStore {
    #[instrument(skip(self, role), fields(role_id = %role.id, organization_id = %role.organization_id), err)]
    async fn create_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        insert_role(&mut tx, role).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn get_role(&self, id: RoleId, visibility: Visibility) -> Result<Option<Role>, StoreError> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1{}",
            live_clause(visibility)
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?;
        row.as_ref()
            .map(role_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_role", e))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id), err)]
    async fn find_role_by_name(
        &self,
        organization_id: OrganizationId,
        name: &str,
        visibility: Visibility,
    ) -> Result<Option<Role>, StoreError> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE organization_id = $1 AND name = $2{} \
             ORDER BY created_at DESC LIMIT 1",
            live_clause(visibility)
        );
        let row = sqlx::query(&sql)
            .bind(organization_id.as_uuid())
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;
        row.as_ref()
            .map(role_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_role", e))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id), err)]
    async fn list_roles(
        &self,
        organization_id: OrganizationId,
        visibility: Visibility,
    ) -> Result<Vec<Role>, StoreError> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE organization_id = $1{} ORDER BY created_at ASC, id ASC",
            live_clause(visibility)
        );
        let rows = sqlx::query(&sql)
            .bind(organization_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        rows.iter()
            .map(role_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_role", e))
    }

    #[instrument(skip(self, role), fields(role_id = %role.id, version = role.version), err)]
    async fn update_role(&self, role: &Role) -> Result<Role, StoreError> {
        write_role(&*self.pool, role).await
    }

    /// The role row stays locked until commit, so a member write binding it
    /// either committed before the count or waits and then finds it deleted.
    #[instrument(skip(self, role), fields(role_id = %role.id, version = role.version), err)]
    async fn delete_role(&self, role: &Role) -> Result<Role, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
            .bind(role.id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_role", e))?
            .ok_or(StoreError::NotFound)?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM organization_members WHERE role_id = $1 AND deleted_at IS NULL",
        )
        .bind(role.id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("count_role_members", e))?;
        let members: i64 = row
            .try_get("n")
            .map_err(|e| map_sqlx_error("decode_count", e))?;
        if members > 0 {
            return Err(StoreError::RoleInUse {
                members: members as u64,
            });
        }

        let deleted = write_role(&mut *tx, role).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(deleted)
    }
}

/// Optimistic role write on a pool or an open transaction.
async fn write_role<'e, E>(executor: E, role: &Role) -> Result<Role, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let sql = format!(
        r#"
        UPDATE roles
        SET name = $3, description = $4, permissions = $5, deleted_at = $6,
            version = version + 1, updated_at = NOW()
        WHERE id = $1 AND version = $2
        RETURNING {ROLE_COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(role.id.as_uuid())
        .bind(role.version)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.permissions.to_names())
        .bind(role.deleted_at)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?
        .ok_or(StoreError::NotFound)?;
    role_from_row(&row).map_err(|e| map_sqlx_error("decode_role", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Members
// ─────────────────────────────────────────────────────────────────────────────

async fn insert_member(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    member: &OrganizationMember,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO organization_members (id, organization_id, user_id, role_id, version, created_at, updated_at, deleted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(member.id.as_uuid())
    .bind(member.organization_id.as_uuid())
    .bind(member.user_id.as_uuid())
    .bind(member.role_id.as_uuid())
    .bind(member.version)
    .bind(member.created_at)
    .bind(member.updated_at)
    .bind(member.deleted_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_member", e))?;
    Ok(())
}

/// Share-lock a live role until commit. Blocks while a role delete holds the
/// row; a role deleted meanwhile reads as absent.
async fn lock_live_role(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    role_id: RoleId,
) -> Result<(), StoreError> {
    sqlx::query("SELECT id FROM roles WHERE id = $1 AND deleted_at IS NULL FOR SHARE")
        .bind(role_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_role", e))?
        .ok_or(StoreError::NotFound)?;
    Ok(())
}

#[async_trait]
impl MemberStore for PostgresStore {
    #[instrument(skip(self, member), fields(member_id = %member.id, organization_id = %member.organization_id), err)]
    async fn create_member(&self, member: &OrganizationMember) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        lock_live_role(&mut tx, member.role_id).await?;
        insert_member(&mut tx, member).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(member_id = %id), err)]
    async fn get_member(
        &self,
        id: MemberId,
        visibility: Visibility,
    ) -> Result<Option<OrganizationMember>, StoreError> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM organization_members WHERE id = $1{}",
            live_clause(visibility)
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_member", e))?;
        row.as_ref()
            .map(member_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_member", e))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, user_id = %user_id), err)]
    async fn find_member(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        visibility: Visibility,
    ) -> Result<Option<OrganizationMember>, StoreError> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM organization_members \
             WHERE organization_id = $1 AND user_id = $2{} \
             ORDER BY (deleted_at IS NULL) DESC, created_at DESC LIMIT 1",
            live_clause(visibility)
        );
        let row = sqlx::query(&sql)
            .bind(organization_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_member", e))?;
        row.as_ref()
            .map(member_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_member", e))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id), err)]
    async fn list_members(
        &self,
        organization_id: OrganizationId,
        visibility: Visibility,
    ) -> Result<Vec<OrganizationMember>, StoreError> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM organization_members WHERE organization_id = $1{} \
             ORDER BY created_at ASC, id ASC",
            live_clause(visibility)
        );
        let rows = sqlx::query(&sql)
            .bind(organization_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_members", e))?;
        rows.iter()
            .map(member_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_member", e))
    }

    #[instrument(skip(self, member), fields(member_id = %member.id, version = member.version), err)]
    async fn update_member(&self, member: &OrganizationMember) -> Result<OrganizationMember, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        if member.deleted_at.is_none() {
            lock_live_role(&mut tx, member.role_id).await?;
        }

        let sql = format!(
            r#"
            UPDATE organization_members
            SET role_id = $3, deleted_at = $4, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {MEMBER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(member.id.as_uuid())
            .bind(member.version)
            .bind(member.role_id.as_uuid())
            .bind(member.deleted_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_member", e))?
            .ok_or(StoreError::NotFound)?;
        let updated = member_from_row(&row).map_err(|e| map_sqlx_error("decode_member", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(updated)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Invites
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl InviteStore for PostgresStore {
    #[instrument(skip(self, invite), fields(invite_id = %invite.id, organization_id = %invite.organization_id), err)]
    async fn create_invite(&self, invite: &OrganizationInvite) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO organization_invites
                (id, organization_id, email, role_id, invited_by, accepted_at, declined_at,
                 version, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(invite.id.as_uuid())
        .bind(invite.organization_id.as_uuid())
        .bind(&invite.email)
        .bind(invite.role_id.as_uuid())
        .bind(invite.invited_by.as_uuid())
        .bind(invite.accepted_at)
        .bind(invite.declined_at)
        .bind(invite.version)
        .bind(invite.created_at)
        .bind(invite.updated_at)
        .bind(invite.deleted_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_invite", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(invite_id = %id), err)]
    async fn get_invite(
        &self,
        id: InviteId,
        visibility: Visibility,
    ) -> Result<Option<OrganizationInvite>, StoreError> {
        let sql = format!(
            "SELECT {INVITE_COLUMNS} FROM organization_invites WHERE id = $1{}",
            live_clause(visibility)
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_invite", e))?;
        row.as_ref()
            .map(invite_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_invite", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let role: GlobalRole = role.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?;
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role,
        is_active: row.try_get("is_active")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get::<Option<DateTime<Utc>>, _>("deleted_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<UserProfile, sqlx::Error> {
    Ok(UserProfile {
        id: ProfileId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn organization_from_row(row: &PgRow) -> Result<Organization, sqlx::Error> {
    Ok(Organization {
        id: OrganizationId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        profile_pic: row.try_get("profile_pic")?,
        is_active: row.try_get("is_active")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    let names: Vec<String> = row.try_get("permissions")?;
    let permissions =
        PermissionSet::from_names(&names).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(Role {
        id: RoleId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        permissions,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn member_from_row(row: &PgRow) -> Result<OrganizationMember, sqlx::Error> {
    Ok(OrganizationMember {
        id: MemberId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        role_id: RoleId::from_uuid(row.try_get("role_id")?),
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn invite_from_row(row: &PgRow) -> Result<OrganizationInvite, sqlx::Error> {
    Ok(OrganizationInvite {
        id: InviteId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        email: row.try_get("email")?,
        role_id: RoleId::from_uuid(row.try_get("role_id")?),
        invited_by: UserId::from_uuid(row.try_get("invited_by")?),
        accepted_at: row.try_get("accepted_at")?,
        declined_at: row.try_get("declined_at")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unique constraint");
                StoreError::Duplicate(format!("{constraint} violated in {operation}"))
            } else {
                StoreError::Database(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}
