//! Shared fixtures for permission integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tessera_core::{TenantId, UserId};
use tessera_permissions::{
    ChangeSet, Clock, ContentTypeGrant, ContentTypeScope, EngineConfig, GrantStore, ManualClock,
    MemoryGrantStore, PermissionError, PermissionResult, PermissionService, ResourceGrant,
    ResourceKind, ResourceScope, Subject, TenantGrant,
};
use tokio::sync::Barrier;

/// Resource kind used across the suites
pub struct Document;

impl ResourceKind for Document {
    const KIND: &'static str = "document";
    type Id = uuid::Uuid;
}

pub struct Fixture {
    pub service: PermissionService,
    pub store: MemoryGrantStore,
    pub clock: Arc<ManualClock>,
}

pub fn fixture() -> Fixture {
    fixture_with(EngineConfig::default())
}

pub fn fixture_with(config: EngineConfig) -> Fixture {
    let store = MemoryGrantStore::new();
    let clock = Arc::new(ManualClock::default());
    let service = PermissionService::builder()
        .with_store(Arc::new(store.clone()))
        .with_clock(clock.clone())
        .with_config(config)
        .build();

    Fixture {
        service,
        store,
        clock,
    }
}

pub fn service_over<S: GrantStore + 'static>(store: Arc<S>, clock: Arc<dyn Clock>) -> PermissionService {
    PermissionService::builder()
        .with_store(store)
        .with_clock(clock)
        .build()
}

/// Store wrapper that fails selected operations and counts calls
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryGrantStore,
    pub fail_resource_lookups: AtomicBool,
    pub fail_commits: AtomicBool,
    pub calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: MemoryGrantStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GrantStore for FaultyStore {
    async fn find_tenant_grant(&self, subject: &Subject) -> PermissionResult<Option<TenantGrant>> {
        self.record();
        self.inner.find_tenant_grant(subject).await
    }

    async fn find_tenant_grants_for_users(
        &self,
        user_ids: &[UserId],
        tenant_id: TenantId,
    ) -> PermissionResult<Vec<TenantGrant>> {
        self.record();
        self.inner.find_tenant_grants_for_users(user_ids, tenant_id).await
    }

    async fn list_user_tenant_grants(&self, user_id: UserId) -> PermissionResult<Vec<TenantGrant>> {
        self.record();
        self.inner.list_user_tenant_grants(user_id).await
    }

    async fn find_content_type_grant(
        &self,
        scope: &ContentTypeScope,
    ) -> PermissionResult<Option<ContentTypeGrant>> {
        self.record();
        self.inner.find_content_type_grant(scope).await
    }

    async fn find_resource_grant(
        &self,
        scope: &ResourceScope,
    ) -> PermissionResult<Option<ResourceGrant>> {
        self.record();
        if self.fail_resource_lookups.load(Ordering::SeqCst) {
            return Err(PermissionError::store("find_resource_grant", "connection reset"));
        }
        self.inner.find_resource_grant(scope).await
    }

    async fn commit(&self, changes: ChangeSet) -> PermissionResult<()> {
        self.record();
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(PermissionError::store("commit", "disk full"));
        }
        self.inner.commit(changes).await
    }

    async fn health_check(&self) -> PermissionResult<()> {
        self.inner.health_check().await
    }
}

/// Store wrapper that holds every tenant lookup until `parties` lookups
/// have happened, so concurrent mutations all read before any writes
pub struct BarrierStore {
    pub inner: MemoryGrantStore,
    barrier: Barrier,
}

impl BarrierStore {
    pub fn new(inner: MemoryGrantStore, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
        }
    }
}

#[async_trait]
impl GrantStore for BarrierStore {
    async fn find_tenant_grant(&self, subject: &Subject) -> PermissionResult<Option<TenantGrant>> {
        let found = self.inner.find_tenant_grant(subject).await;
        self.barrier.wait().await;
        found
    }

    async fn find_tenant_grants_for_users(
        &self,
        user_ids: &[UserId],
        tenant_id: TenantId,
    ) -> PermissionResult<Vec<TenantGrant>> {
        self.inner.find_tenant_grants_for_users(user_ids, tenant_id).await
    }

    async fn list_user_tenant_grants(&self, user_id: UserId) -> PermissionResult<Vec<TenantGrant>> {
        self.inner.list_user_tenant_grants(user_id).await
    }

    async fn find_content_type_grant(
        &self,
        scope: &ContentTypeScope,
    ) -> PermissionResult<Option<ContentTypeGrant>> {
        self.inner.find_content_type_grant(scope).await
    }

    async fn find_resource_grant(
        &self,
        scope: &ResourceScope,
    ) -> PermissionResult<Option<ResourceGrant>> {
        self.inner.find_resource_grant(scope).await
    }

    async fn commit(&self, changes: ChangeSet) -> PermissionResult<()> {
        self.inner.commit(changes).await
    }

    async fn health_check(&self) -> PermissionResult<()> {
        self.inner.health_check().await
    }
}

/// Single-connection in-memory SQLite store
#[cfg(feature = "sqlite")]
pub async fn memory_sqlite_store() -> tessera_permissions::SqliteGrantStore {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory database");

    tessera_permissions::SqliteGrantStore::new(pool)
        .await
        .expect("create grant tables")
}
