//! Relational schema.
//!
//! Every table carries `version`, `created_at`, `updated_at` and `deleted_at`
//! (soft delete + optimistic concurrency). Ownership (organization → roles,
//! members) is not cascaded by the database.

use sqlx::PgPool;
use tracing::info;

use super::StoreError;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id              UUID PRIMARY KEY,
        email           TEXT NOT NULL UNIQUE,
        password_hash   TEXT NOT NULL,
        role            TEXT NOT NULL DEFAULT 'client',
        is_active       BOOLEAN NOT NULL DEFAULT FALSE,
        version         BIGINT NOT NULL DEFAULT 1,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at      TIMESTAMPTZ NULL,
        CONSTRAINT users_role_chk CHECK (role IN ('admin', 'staff', 'client'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_profiles (
        id              UUID PRIMARY KEY,
        user_id         UUID NOT NULL UNIQUE REFERENCES users(id),
        first_name      TEXT NOT NULL,
        last_name       TEXT NOT NULL,
        version         BIGINT NOT NULL DEFAULT 1,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at      TIMESTAMPTZ NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        id              UUID PRIMARY KEY,
        name            TEXT NOT NULL UNIQUE,
        description     TEXT NOT NULL DEFAULT '',
        profile_pic     TEXT NULL,
        is_active       BOOLEAN NOT NULL DEFAULT TRUE,
        version         BIGINT NOT NULL DEFAULT 1,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at      TIMESTAMPTZ NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id              UUID PRIMARY KEY,
        organization_id UUID NOT NULL REFERENCES organizations(id),
        name            TEXT NOT NULL,
        description     TEXT NOT NULL DEFAULT '',
        permissions     TEXT[] NOT NULL DEFAULT '{}',
        version         BIGINT NOT NULL DEFAULT 1,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at      TIMESTAMPTZ NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS roles_org_name_live_idx
        ON roles (organization_id, name) WHERE deleted_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organization_members (
        id              UUID PRIMARY KEY,
        organization_id UUID NOT NULL REFERENCES organizations(id),
        user_id         UUID NOT NULL REFERENCES users(id),
        role_id         UUID NOT NULL REFERENCES roles(id),
        version         BIGINT NOT NULL DEFAULT 1,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at      TIMESTAMPTZ NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS organization_members_live_idx
        ON organization_members (organization_id, user_id) WHERE deleted_at IS NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS organization_members_role_idx
        ON organization_members (role_id) WHERE deleted_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organization_invites (
        id              UUID PRIMARY KEY,
        organization_id UUID NOT NULL REFERENCES organizations(id),
        email           TEXT NOT NULL,
        role_id         UUID NOT NULL REFERENCES roles(id),
        invited_by      UUID NOT NULL REFERENCES users(id),
        accepted_at     TIMESTAMPTZ NULL,
        declined_at     TIMESTAMPTZ NULL,
        version         BIGINT NOT NULL DEFAULT 1,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at      TIMESTAMPTZ NULL
    )
    "#,
];

/// Create tables and indexes if they do not exist. Idempotent.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for statement in STATEMENTS {
        sqlx::query(*statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
    }
    info!(statements = STATEMENTS.len(), "schema up to date");
    Ok(())
}
