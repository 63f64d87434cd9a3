//! SQLite grant storage

use super::{ChangeSet, GrantChange, GrantStore};
use crate::error::{PermissionError, PermissionResult};
use crate::grant::{
    ContentTypeGrant, ContentTypeScope, Grant, ResourceGrant, ResourceScope, Subject, TenantGrant,
};
use crate::permission::PermissionSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use tessera_core::{TenantId, UserId};
use tracing::{debug, error, info};
use uuid::Uuid;

const GRANT_COLUMNS: &str = "id, user_id, tenant_id, permission_flags1, permission_flags2, \
     expires_at, deleted_at, created_at, updated_at";

/// Prefer the live row, then the most recent one
const CURRENT_ROW_ORDER: &str = "(deleted_at IS NULL) DESC, updated_at DESC";

/// Users per `IN (...)` lookup, kept well below SQLite's bound parameter limit
const USER_LOOKUP_CHUNK: usize = 500;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenant_grants (
        id TEXT PRIMARY KEY,
        user_id TEXT,
        tenant_id TEXT,
        permission_flags1 INTEGER NOT NULL DEFAULT 0,
        permission_flags2 INTEGER NOT NULL DEFAULT 0,
        expires_at TEXT,
        deleted_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tenant_grants_scope ON tenant_grants(user_id, tenant_id)",
    r#"
    CREATE TABLE IF NOT EXISTS content_type_grants (
        id TEXT PRIMARY KEY,
        user_id TEXT,
        tenant_id TEXT,
        content_type TEXT NOT NULL,
        permission_flags1 INTEGER NOT NULL DEFAULT 0,
        permission_flags2 INTEGER NOT NULL DEFAULT 0,
        expires_at TEXT,
        deleted_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_content_type_grants_scope ON content_type_grants(content_type, user_id, tenant_id)",
    r#"
    CREATE TABLE IF NOT EXISTS resource_grants (
        id TEXT PRIMARY KEY,
        user_id TEXT,
        tenant_id TEXT,
        resource_kind TEXT NOT NULL,
        resource_id TEXT NOT NULL,
        permission_flags1 INTEGER NOT NULL DEFAULT 0,
        permission_flags2 INTEGER NOT NULL DEFAULT 0,
        expires_at TEXT,
        deleted_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_resource_grants_scope ON resource_grants(resource_kind, resource_id, user_id, tenant_id)",
];

/// Database grant record
#[derive(Debug, sqlx::FromRow)]
struct GrantRow {
    id: String,
    user_id: Option<String>,
    tenant_id: Option<String>,
    permission_flags1: i64,
    permission_flags2: i64,
    expires_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(default)]
    content_type: Option<String>,
    #[sqlx(default)]
    resource_kind: Option<String>,
    #[sqlx(default)]
    resource_id: Option<String>,
}

impl GrantRow {
    fn subject(&self) -> PermissionResult<Subject> {
        let user_id = self
            .user_id
            .as_deref()
            .map(|id| id.parse::<UserId>())
            .transpose()
            .map_err(|e| PermissionError::store("decode_user_id", e))?;
        let tenant_id = self
            .tenant_id
            .as_deref()
            .map(|id| id.parse::<TenantId>())
            .transpose()
            .map_err(|e| PermissionError::store("decode_tenant_id", e))?;
        Ok(Subject::from_parts(user_id, tenant_id))
    }

    fn into_grant<S>(self, scope: S) -> PermissionResult<Grant<S>> {
        let id = Uuid::parse_str(&self.id).map_err(|e| PermissionError::store("decode_id", e))?;
        Ok(Grant {
            id,
            scope,
            // Words are stored as signed integers; the casts keep every bit
            permissions: PermissionSet::from_words(
                self.permission_flags1 as u64,
                self.permission_flags2 as u64,
            ),
            expires_at: self.expires_at,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn into_tenant_grant(self) -> PermissionResult<TenantGrant> {
        let subject = self.subject()?;
        self.into_grant(subject)
    }

    fn into_content_type_grant(self) -> PermissionResult<ContentTypeGrant> {
        let subject = self.subject()?;
        let content_type = self
            .content_type
            .clone()
            .ok_or_else(|| PermissionError::store("decode_content_type", "missing content_type column"))?;
        self.into_grant(ContentTypeScope::new(subject, content_type))
    }

    fn into_resource_grant(self) -> PermissionResult<ResourceGrant> {
        let subject = self.subject()?;
        let (Some(resource_kind), Some(resource_id)) =
            (self.resource_kind.clone(), self.resource_id.clone())
        else {
            return Err(PermissionError::store(
                "decode_resource",
                "missing resource_kind or resource_id column",
            ));
        };
        self.into_grant(ResourceScope {
            subject,
            resource_kind,
            resource_id,
        })
    }
}

fn subject_columns(subject: &Subject) -> (Option<String>, Option<String>) {
    (
        subject.user_id().map(|id| id.to_string()),
        subject.tenant_id().map(|id| id.to_string()),
    )
}

/// SQLite grant store implementation
#[derive(Debug, Clone)]
pub struct SqliteGrantStore {
    pool: SqlitePool,
}

impl SqliteGrantStore {
    /// Wrap an existing pool and create the grant tables if needed
    pub async fn new(pool: SqlitePool) -> PermissionResult<Self> {
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    /// Create from database URL
    pub async fn from_url(database_url: &str) -> PermissionResult<Self> {
        let pool = SqlitePool::connect(database_url).await.map_err(|e| {
            error!("Failed to connect to SQLite database: {}", e);
            PermissionError::store("connect", e)
        })?;
        Self::new(pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(&self) -> PermissionResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to create grant tables: {}", e);
                    PermissionError::store("create_tables", e)
                })?;
        }

        info!("Grant tables ready");
        Ok(())
    }

    async fn upsert(
        conn: &mut sqlx::SqliteConnection,
        change: &GrantChange,
    ) -> Result<(), sqlx::Error> {
        match change {
            GrantChange::Tenant(grant) => {
                let (user_id, tenant_id) = subject_columns(grant.subject());
                sqlx::query(
                    r#"
                    INSERT INTO tenant_grants
                    (id, user_id, tenant_id, permission_flags1, permission_flags2,
                     expires_at, deleted_at, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        permission_flags1 = excluded.permission_flags1,
                        permission_flags2 = excluded.permission_flags2,
                        expires_at = excluded.expires_at,
                        deleted_at = excluded.deleted_at,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(grant.id.to_string())
                .bind(user_id)
                .bind(tenant_id)
                .bind(grant.permissions.flags1() as i64)
                .bind(grant.permissions.flags2() as i64)
                .bind(grant.expires_at)
                .bind(grant.deleted_at)
                .bind(grant.created_at)
                .bind(grant.updated_at)
                .execute(&mut *conn)
                .await?;
            }
            GrantChange::ContentType(grant) => {
                let (user_id, tenant_id) = subject_columns(grant.subject());
                sqlx::query(
                    r#"
                    INSERT INTO content_type_grants
                    (id, user_id, tenant_id, content_type, permission_flags1, permission_flags2,
                     expires_at, deleted_at, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        permission_flags1 = excluded.permission_flags1,
                        permission_flags2 = excluded.permission_flags2,
                        expires_at = excluded.expires_at,
                        deleted_at = excluded.deleted_at,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(grant.id.to_string())
                .bind(user_id)
                .bind(tenant_id)
                .bind(&grant.scope.content_type)
                .bind(grant.permissions.flags1() as i64)
                .bind(grant.permissions.flags2() as i64)
                .bind(grant.expires_at)
                .bind(grant.deleted_at)
                .bind(grant.created_at)
                .bind(grant.updated_at)
                .execute(&mut *conn)
                .await?;
            }
            GrantChange::Resource(grant) => {
                let (user_id, tenant_id) = subject_columns(grant.subject());
                sqlx::query(
                    r#"
                    INSERT INTO resource_grants
                    (id, user_id, tenant_id, resource_kind, resource_id, permission_flags1,
                     permission_flags2, expires_at, deleted_at, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        permission_flags1 = excluded.permission_flags1,
                        permission_flags2 = excluded.permission_flags2,
                        expires_at = excluded.expires_at,
                        deleted_at = excluded.deleted_at,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(grant.id.to_string())
                .bind(user_id)
                .bind(tenant_id)
                .bind(&grant.scope.resource_kind)
                .bind(&grant.scope.resource_id)
                .bind(grant.permissions.flags1() as i64)
                .bind(grant.permissions.flags2() as i64)
                .bind(grant.expires_at)
                .bind(grant.deleted_at)
                .bind(grant.created_at)
                .bind(grant.updated_at)
                .execute(&mut *conn)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GrantStore for SqliteGrantStore {
    async fn find_tenant_grant(&self, subject: &Subject) -> PermissionResult<Option<TenantGrant>> {
        let (user_id, tenant_id) = subject_columns(subject);
        let query = format!(
            "SELECT {} FROM tenant_grants WHERE user_id IS ? AND tenant_id IS ? ORDER BY {} LIMIT 1",
            GRANT_COLUMNS, CURRENT_ROW_ORDER
        );

        let row = sqlx::query_as::<_, GrantRow>(&query)
            .bind(user_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to load tenant grant for {}: {}", subject, e);
                PermissionError::store("find_tenant_grant", e)
            })?;

        row.map(GrantRow::into_tenant_grant).transpose()
    }

    async fn find_tenant_grants_for_users(
        &self,
        user_ids: &[UserId],
        tenant_id: TenantId,
    ) -> PermissionResult<Vec<TenantGrant>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let mut grants = Vec::new();
        for chunk in user_ids.chunks(USER_LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {} FROM tenant_grants WHERE tenant_id = ",
                GRANT_COLUMNS
            ));
            builder.push_bind(tenant_id.to_string());
            builder.push(" AND user_id IN (");
            let mut separated = builder.separated(", ");
            for user_id in chunk {
                separated.push_bind(user_id.to_string());
            }
            separated.push_unseparated(")");
            builder.push(format!(" ORDER BY user_id, {}", CURRENT_ROW_ORDER));

            let rows = builder
                .build_query_as::<GrantRow>()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to load tenant grants for {} users: {}", chunk.len(), e);
                    PermissionError::store("find_tenant_grants_for_users", e)
                })?;

            // Rows arrive grouped by user with the current row first
            for row in rows {
                if seen.insert(row.user_id.clone()) {
                    grants.push(row.into_tenant_grant()?);
                }
            }
        }

        debug!(
            "Loaded {} existing tenant grants for {} users",
            grants.len(),
            user_ids.len()
        );
        Ok(grants)
    }

    async fn list_user_tenant_grants(&self, user_id: UserId) -> PermissionResult<Vec<TenantGrant>> {
        let query = format!(
            "SELECT {} FROM tenant_grants WHERE user_id = ? AND tenant_id IS NOT NULL \
             ORDER BY tenant_id, {}",
            GRANT_COLUMNS, CURRENT_ROW_ORDER
        );

        let rows = sqlx::query_as::<_, GrantRow>(&query)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to list tenant grants for user {}: {}", user_id, e);
                PermissionError::store("list_user_tenant_grants", e)
            })?;

        let mut seen = HashSet::new();
        let mut grants = Vec::new();
        for row in rows {
            if seen.insert(row.tenant_id.clone()) {
                grants.push(row.into_tenant_grant()?);
            }
        }
        grants.sort_by_key(|g| g.created_at);
        Ok(grants)
    }

    async fn find_content_type_grant(
        &self,
        scope: &ContentTypeScope,
    ) -> PermissionResult<Option<ContentTypeGrant>> {
        let (user_id, tenant_id) = subject_columns(&scope.subject);
        let query = format!(
            "SELECT {}, content_type FROM content_type_grants \
             WHERE content_type = ? AND user_id IS ? AND tenant_id IS ? ORDER BY {} LIMIT 1",
            GRANT_COLUMNS, CURRENT_ROW_ORDER
        );

        let row = sqlx::query_as::<_, GrantRow>(&query)
            .bind(&scope.content_type)
            .bind(user_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    "Failed to load content type grant {} for {}: {}",
                    scope.content_type, scope.subject, e
                );
                PermissionError::store("find_content_type_grant", e)
            })?;

        row.map(GrantRow::into_content_type_grant).transpose()
    }

    async fn find_resource_grant(
        &self,
        scope: &ResourceScope,
    ) -> PermissionResult<Option<ResourceGrant>> {
        let (user_id, tenant_id) = subject_columns(&scope.subject);
        let query = format!(
            "SELECT {}, resource_kind, resource_id FROM resource_grants \
             WHERE resource_kind = ? AND resource_id = ? AND user_id IS ? AND tenant_id IS ? \
             ORDER BY {} LIMIT 1",
            GRANT_COLUMNS, CURRENT_ROW_ORDER
        );

        let row = sqlx::query_as::<_, GrantRow>(&query)
            .bind(&scope.resource_kind)
            .bind(&scope.resource_id)
            .bind(user_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    "Failed to load resource grant {}/{} for {}: {}",
                    scope.resource_kind, scope.resource_id, scope.subject, e
                );
                PermissionError::store("find_resource_grant", e)
            })?;

        row.map(GrantRow::into_resource_grant).transpose()
    }

    async fn commit(&self, changes: ChangeSet) -> PermissionResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to open grant transaction: {}", e);
            PermissionError::store("begin", e)
        })?;

        for change in changes.iter() {
            // Dropping the transaction on error rolls every change back
            Self::upsert(&mut *tx, change).await.map_err(|e| {
                error!("Failed to write grant for {}: {}", change.subject(), e);
                PermissionError::store("commit", e)
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit grant transaction: {}", e);
            PermissionError::store("commit", e)
        })?;

        debug!("Committed {} grant changes to SQLite storage", changes.len());
        Ok(())
    }

    async fn health_check(&self) -> PermissionResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PermissionError::store("health_check", e))?;

        Ok(())
    }
}
