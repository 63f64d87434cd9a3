//! In-memory grant storage

use super::{current_row, ChangeSet, GrantChange, GrantStore};
use crate::error::PermissionResult;
use crate::grant::{
    ContentTypeGrant, ContentTypeScope, ResourceGrant, ResourceScope, Subject, TenantGrant,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{TenantId, UserId};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    tenant: HashMap<Uuid, TenantGrant>,
    content_type: HashMap<Uuid, ContentTypeGrant>,
    resource: HashMap<Uuid, ResourceGrant>,
}

/// In-memory grant store (default implementation)
///
/// All three tables sit behind one lock so a [`ChangeSet`] is applied
/// atomically.
#[derive(Debug, Clone, Default)]
pub struct MemoryGrantStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows per table: (tenant, content type, resource)
    pub async fn row_counts(&self) -> (usize, usize, usize) {
        let tables = self.tables.read().await;
        (
            tables.tenant.len(),
            tables.content_type.len(),
            tables.resource.len(),
        )
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn find_tenant_grant(&self, subject: &Subject) -> PermissionResult<Option<TenantGrant>> {
        let tables = self.tables.read().await;
        Ok(current_row(tables.tenant.values().filter(|g| &g.scope == subject)).cloned())
    }

    async fn find_tenant_grants_for_users(
        &self,
        user_ids: &[UserId],
        tenant_id: TenantId,
    ) -> PermissionResult<Vec<TenantGrant>> {
        let tables = self.tables.read().await;
        let grants = user_ids
            .iter()
            .filter_map(|user_id| {
                let subject = Subject::member(*user_id, tenant_id);
                current_row(tables.tenant.values().filter(|g| g.scope == subject)).cloned()
            })
            .collect();
        Ok(grants)
    }

    async fn list_user_tenant_grants(&self, user_id: UserId) -> PermissionResult<Vec<TenantGrant>> {
        let tables = self.tables.read().await;

        let mut by_tenant: HashMap<TenantId, Vec<&TenantGrant>> = HashMap::new();
        for grant in tables.tenant.values() {
            if let Subject::User {
                user_id: owner,
                tenant_id: Some(tenant_id),
            } = grant.scope
            {
                if owner == user_id {
                    by_tenant.entry(tenant_id).or_default().push(grant);
                }
            }
        }

        let mut grants: Vec<TenantGrant> = by_tenant
            .into_values()
            .filter_map(|rows| current_row(rows).cloned())
            .collect();
        grants.sort_by_key(|g| g.created_at);
        Ok(grants)
    }

    async fn find_content_type_grant(
        &self,
        scope: &ContentTypeScope,
    ) -> PermissionResult<Option<ContentTypeGrant>> {
        let tables = self.tables.read().await;
        Ok(current_row(tables.content_type.values().filter(|g| &g.scope == scope)).cloned())
    }

    async fn find_resource_grant(
        &self,
        scope: &ResourceScope,
    ) -> PermissionResult<Option<ResourceGrant>> {
        let tables = self.tables.read().await;
        Ok(current_row(tables.resource.values().filter(|g| &g.scope == scope)).cloned())
    }

    async fn commit(&self, changes: ChangeSet) -> PermissionResult<()> {
        let mut tables = self.tables.write().await;
        let count = changes.len();

        for change in changes {
            match change {
                GrantChange::Tenant(grant) => {
                    tables.tenant.insert(grant.id, grant);
                }
                GrantChange::ContentType(grant) => {
                    tables.content_type.insert(grant.id, grant);
                }
                GrantChange::Resource(grant) => {
                    tables.resource.insert(grant.id, grant);
                }
            }
        }

        debug!("Committed {} grant changes to memory storage", count);
        Ok(())
    }

    async fn health_check(&self) -> PermissionResult<()> {
        // Memory storage is always healthy
        Ok(())
    }
}
