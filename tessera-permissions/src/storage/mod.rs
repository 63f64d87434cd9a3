//! Grant storage backends
//!
//! The engine reads grants by exact scope and writes them back through a
//! [`ChangeSet`] that a backend must apply atomically: either every change
//! in the set is persisted or none is.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryGrantStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteGrantStore;

use crate::error::PermissionResult;
use crate::grant::{
    ContentTypeGrant, ContentTypeScope, Grant, ResourceGrant, ResourceScope, Subject, TenantGrant,
};
use async_trait::async_trait;
use std::sync::Arc;
use tessera_core::{TenantId, UserId};

/// Persistence interface over the three grant shapes
///
/// `find_*` lookups return the current row for a scope: the non-deleted row
/// if there is one, otherwise the most recently updated soft-deleted row.
/// Expired rows are returned as-is; validity is decided by the caller.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn find_tenant_grant(&self, subject: &Subject) -> PermissionResult<Option<TenantGrant>>;

    /// Current rows for `(user, tenant)` for each listed user. Backends may
    /// split a long user list into several queries.
    async fn find_tenant_grants_for_users(
        &self,
        user_ids: &[UserId],
        tenant_id: TenantId,
    ) -> PermissionResult<Vec<TenantGrant>>;

    /// Current rows of every `(user, tenant)` pair with a tenant set
    async fn list_user_tenant_grants(&self, user_id: UserId) -> PermissionResult<Vec<TenantGrant>>;

    async fn find_content_type_grant(
        &self,
        scope: &ContentTypeScope,
    ) -> PermissionResult<Option<ContentTypeGrant>>;

    async fn find_resource_grant(
        &self,
        scope: &ResourceScope,
    ) -> PermissionResult<Option<ResourceGrant>>;

    /// Insert or update every grant in `changes` in one transaction
    async fn commit(&self, changes: ChangeSet) -> PermissionResult<()>;

    /// Health check for the storage backend
    async fn health_check(&self) -> PermissionResult<()>;
}

#[async_trait]
impl<T: GrantStore + ?Sized> GrantStore for Arc<T> {
    async fn find_tenant_grant(&self, subject: &Subject) -> PermissionResult<Option<TenantGrant>> {
        (**self).find_tenant_grant(subject).await
    }

    async fn find_tenant_grants_for_users(
        &self,
        user_ids: &[UserId],
        tenant_id: TenantId,
    ) -> PermissionResult<Vec<TenantGrant>> {
        (**self).find_tenant_grants_for_users(user_ids, tenant_id).await
    }

    async fn list_user_tenant_grants(&self, user_id: UserId) -> PermissionResult<Vec<TenantGrant>> {
        (**self).list_user_tenant_grants(user_id).await
    }

    async fn find_content_type_grant(
        &self,
        scope: &ContentTypeScope,
    ) -> PermissionResult<Option<ContentTypeGrant>> {
        (**self).find_content_type_grant(scope).await
    }

    async fn find_resource_grant(
        &self,
        scope: &ResourceScope,
    ) -> PermissionResult<Option<ResourceGrant>> {
        (**self).find_resource_grant(scope).await
    }

    async fn commit(&self, changes: ChangeSet) -> PermissionResult<()> {
        (**self).commit(changes).await
    }

    async fn health_check(&self) -> PermissionResult<()> {
        (**self).health_check().await
    }
}

/// One pending write
#[derive(Debug, Clone, PartialEq)]
pub enum GrantChange {
    Tenant(TenantGrant),
    ContentType(ContentTypeGrant),
    Resource(ResourceGrant),
}

impl GrantChange {
    pub fn subject(&self) -> &Subject {
        match self {
            GrantChange::Tenant(grant) => grant.subject(),
            GrantChange::ContentType(grant) => grant.subject(),
            GrantChange::Resource(grant) => grant.subject(),
        }
    }
}

impl From<TenantGrant> for GrantChange {
    fn from(grant: TenantGrant) -> Self {
        GrantChange::Tenant(grant)
    }
}

impl From<ContentTypeGrant> for GrantChange {
    fn from(grant: ContentTypeGrant) -> Self {
        GrantChange::ContentType(grant)
    }
}

impl From<ResourceGrant> for GrantChange {
    fn from(grant: ResourceGrant) -> Self {
        GrantChange::Resource(grant)
    }
}

/// Ordered batch of pending writes, applied all-or-nothing
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<GrantChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: GrantChange) {
        self.changes.push(change);
    }

    pub fn tenant(mut self, grant: TenantGrant) -> Self {
        self.push(GrantChange::Tenant(grant));
        self
    }

    pub fn content_type(mut self, grant: ContentTypeGrant) -> Self {
        self.push(GrantChange::ContentType(grant));
        self
    }

    pub fn resource(mut self, grant: ResourceGrant) -> Self {
        self.push(GrantChange::Resource(grant));
        self
    }

    /// Single-change set
    pub fn single<G: Into<GrantChange>>(grant: G) -> Self {
        Self {
            changes: vec![grant.into()],
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GrantChange> {
        self.changes.iter()
    }
}

impl IntoIterator for ChangeSet {
    type Item = GrantChange;
    type IntoIter = std::vec::IntoIter<GrantChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl Extend<GrantChange> for ChangeSet {
    fn extend<I: IntoIterator<Item = GrantChange>>(&mut self, iter: I) {
        self.changes.extend(iter);
    }
}

/// Pick the current row among all rows sharing one scope
pub(crate) fn current_row<'a, S: 'a>(
    rows: impl IntoIterator<Item = &'a Grant<S>>,
) -> Option<&'a Grant<S>> {
    rows.into_iter()
        .max_by_key(|grant| (grant.deleted_at.is_none(), grant.updated_at))
}
