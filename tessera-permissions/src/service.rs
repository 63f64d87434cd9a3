//! Permission service facade
//!
//! [`PermissionService`] wires one store and one clock into the resolver,
//! the mutator and the membership manager and exposes all of their
//! operations in one place.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::PermissionResult;
use crate::grant::{
    ContentTypeGrant, ContentTypeScope, ResourceGrant, ResourceKind, Subject, TenantGrant,
};
use crate::membership::MembershipManager;
use crate::mutator::GrantMutator;
use crate::permission::PermissionType;
use crate::resolver::Resolver;
use crate::storage::{GrantStore, MemoryGrantStore};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tessera_core::{StorageBackend, TenantId, TesseraConfig, UserId};
use tracing::info;

/// Builder for [`PermissionService`]
pub struct PermissionServiceBuilder {
    store: Option<Arc<dyn GrantStore>>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Default for PermissionServiceBuilder {
    fn default() -> Self {
        Self {
            store: None,
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }
}

impl PermissionServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom storage backend (memory storage otherwise)
    pub fn with_store(mut self, store: Arc<dyn GrantStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> PermissionService {
        let store: Arc<dyn GrantStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryGrantStore::new()),
        };

        PermissionService {
            resolver: Resolver::new(store.clone(), self.clock.clone()),
            mutator: GrantMutator::new(store.clone(), self.clock.clone(), self.config.clone()),
            membership: MembershipManager::new(
                store.clone(),
                self.clock,
                self.config.member_default_permissions,
            ),
            store,
        }
    }
}

/// Entry point of the permission engine
#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn GrantStore>,
    resolver: Resolver,
    mutator: GrantMutator,
    membership: MembershipManager,
}

impl PermissionService {
    /// Memory-backed service with default settings
    pub fn new() -> Self {
        PermissionServiceBuilder::new().build()
    }

    pub fn builder() -> PermissionServiceBuilder {
        PermissionServiceBuilder::new()
    }

    /// Build from the application configuration, opening the configured store
    pub async fn from_config(config: &TesseraConfig) -> PermissionResult<Self> {
        let engine = EngineConfig::from_settings(&config.permissions)?;
        let store = open_store(config).await?;

        info!(
            backend = %config.storage.backend,
            max_permissions_per_grant = engine.max_permissions_per_grant,
            "Permission service initialized"
        );

        Ok(PermissionServiceBuilder::new()
            .with_store(store)
            .with_config(engine)
            .build())
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn mutator(&self) -> &GrantMutator {
        &self.mutator
    }

    pub fn membership(&self) -> &MembershipManager {
        &self.membership
    }

    pub async fn health_check(&self) -> PermissionResult<()> {
        self.store.health_check().await
    }

    // ========================================
    // Resolution
    // ========================================

    pub async fn has_permission(
        &self,
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
        permission: PermissionType,
    ) -> PermissionResult<bool> {
        self.resolver.has_permission(user_id, tenant_id, permission).await
    }

    pub async fn effective_permissions(
        &self,
        user_id: UserId,
        tenant_id: Option<TenantId>,
    ) -> PermissionResult<BTreeSet<PermissionType>> {
        self.resolver.effective_permissions(user_id, tenant_id).await
    }

    pub async fn has_content_type_permission(
        &self,
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
        content_type: &str,
        permission: PermissionType,
    ) -> PermissionResult<bool> {
        self.resolver
            .has_content_type_permission(user_id, tenant_id, content_type, permission)
            .await
    }

    pub async fn has_resource_permission<K: ResourceKind>(
        &self,
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
        resource_id: &K::Id,
        permission: PermissionType,
    ) -> PermissionResult<bool> {
        self.resolver
            .has_resource_permission::<K>(user_id, tenant_id, resource_id, permission)
            .await
    }

    pub async fn can_access_resource<K: ResourceKind>(
        &self,
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
        resource_id: &K::Id,
        permission: PermissionType,
    ) -> PermissionResult<bool> {
        self.resolver
            .can_access_resource::<K>(user_id, tenant_id, resource_id, permission)
            .await
    }

    // ========================================
    // Mutation
    // ========================================

    pub async fn grant(
        &self,
        subject: Subject,
        permissions: &[PermissionType],
    ) -> PermissionResult<TenantGrant> {
        self.mutator.grant(subject, permissions).await
    }

    pub async fn revoke(
        &self,
        subject: Subject,
        permissions: &[PermissionType],
    ) -> PermissionResult<Option<TenantGrant>> {
        self.mutator.revoke(subject, permissions).await
    }

    pub async fn revoke_all(&self, subject: Subject) -> PermissionResult<Option<TenantGrant>> {
        self.mutator.revoke_all(subject).await
    }

    pub async fn bulk_grant(
        &self,
        user_ids: &[UserId],
        tenant_id: TenantId,
        permissions: &[PermissionType],
    ) -> PermissionResult<Vec<TenantGrant>> {
        self.mutator.bulk_grant(user_ids, tenant_id, permissions).await
    }

    pub async fn grant_content_type(
        &self,
        scope: ContentTypeScope,
        permissions: &[PermissionType],
    ) -> PermissionResult<ContentTypeGrant> {
        self.mutator.grant_content_type(scope, permissions).await
    }

    pub async fn revoke_content_type(
        &self,
        scope: ContentTypeScope,
        permissions: &[PermissionType],
    ) -> PermissionResult<Option<ContentTypeGrant>> {
        self.mutator.revoke_content_type(scope, permissions).await
    }

    pub async fn grant_resource<K: ResourceKind>(
        &self,
        subject: Subject,
        resource_id: &K::Id,
        permissions: &[PermissionType],
    ) -> PermissionResult<ResourceGrant> {
        self.mutator
            .grant_resource::<K>(subject, resource_id, permissions)
            .await
    }

    pub async fn revoke_resource<K: ResourceKind>(
        &self,
        subject: Subject,
        resource_id: &K::Id,
        permissions: &[PermissionType],
    ) -> PermissionResult<Option<ResourceGrant>> {
        self.mutator
            .revoke_resource::<K>(subject, resource_id, permissions)
            .await
    }

    pub async fn share_resource<K: ResourceKind>(
        &self,
        resource_id: &K::Id,
        target_user: UserId,
        tenant_id: Option<TenantId>,
        permissions: &[PermissionType],
        expires_at: Option<DateTime<Utc>>,
    ) -> PermissionResult<ResourceGrant> {
        self.mutator
            .share_resource::<K>(resource_id, target_user, tenant_id, permissions, expires_at)
            .await
    }

    // ========================================
    // Membership
    // ========================================

    pub async fn join(&self, user_id: UserId, tenant_id: TenantId) -> PermissionResult<TenantGrant> {
        self.membership.join(user_id, tenant_id).await
    }

    pub async fn leave(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> PermissionResult<Option<TenantGrant>> {
        self.membership.leave(user_id, tenant_id).await
    }

    pub async fn is_member(&self, user_id: UserId, tenant_id: TenantId) -> PermissionResult<bool> {
        self.resolver.is_member(user_id, tenant_id).await
    }

    pub async fn update_expiration(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        expires_at: Option<DateTime<Utc>>,
    ) -> PermissionResult<TenantGrant> {
        self.membership
            .update_expiration(user_id, tenant_id, expires_at)
            .await
    }

    pub async fn list_tenants_for_user(&self, user_id: UserId) -> PermissionResult<Vec<TenantGrant>> {
        self.membership.list_tenants_for_user(user_id).await
    }
}

impl Default for PermissionService {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the store selected by `[storage]`
pub async fn open_store(config: &TesseraConfig) -> PermissionResult<Arc<dyn GrantStore>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryGrantStore::new())),
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => {
            let store =
                crate::storage::SqliteGrantStore::from_url(&config.storage.database_url).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => Err(crate::error::PermissionError::config(
            "SQLite storage requested but the `sqlite` feature is disabled",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PermissionError;

    #[tokio::test]
    async fn test_from_config_rejects_bad_permission_settings() {
        let mut config = TesseraConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.permissions.member_default_permissions = vec!["fly".into()];

        let err = PermissionService::from_config(&config).await.err().unwrap();
        assert!(matches!(err, PermissionError::Config { .. }));
    }

    #[tokio::test]
    async fn test_memory_service_round_trip() {
        let mut config = TesseraConfig::default();
        config.storage.backend = StorageBackend::Memory;
        let service = PermissionService::from_config(&config).await.unwrap();
        service.health_check().await.unwrap();

        let (user, tenant) = (UserId::new(), TenantId::new());
        service.join(user, tenant).await.unwrap();
        assert!(service.is_member(user, tenant).await.unwrap());
        assert!(service
            .has_permission(Some(user), Some(tenant), PermissionType::Read)
            .await
            .unwrap());
    }
}
