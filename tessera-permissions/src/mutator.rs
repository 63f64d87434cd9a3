//! Grant and revoke operations
//!
//! Every mutation is one lookup followed by one atomic commit. Nothing is
//! locked between the two, so concurrent writes to the same scope race and
//! the last commit wins.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{PermissionError, PermissionResult};
use crate::grant::{
    ContentTypeGrant, ContentTypeScope, Grant, GrantScope, ResourceGrant, ResourceKind,
    ResourceScope, Subject, TenantGrant,
};
use crate::permission::PermissionType;
use crate::resolver::validate_content_type;
use crate::storage::{ChangeSet, GrantChange, GrantStore};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tessera_core::{TenantId, UserId};
use tracing::{debug, info};

/// OR `permissions` into the live row, or start a fresh one
fn merge_or_create<S: GrantScope>(
    existing: Option<Grant<S>>,
    scope: S,
    permissions: &[PermissionType],
    now: DateTime<Utc>,
) -> Grant<S> {
    match existing.filter(|grant| !grant.is_deleted()) {
        Some(mut grant) => {
            grant.add_permissions(permissions);
            grant.touch(now);
            grant
        }
        None => Grant::new(scope, permissions.iter().copied().collect(), now),
    }
}

/// Writes grants through the store
#[derive(Clone)]
pub struct GrantMutator {
    store: Arc<dyn GrantStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl GrantMutator {
    pub fn new(store: Arc<dyn GrantStore>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn validate_permissions(&self, permissions: &[PermissionType]) -> PermissionResult<()> {
        if permissions.is_empty() {
            return Err(PermissionError::validation(
                "permissions",
                "at least one permission is required",
            ));
        }
        if permissions.len() > self.config.max_permissions_per_grant {
            return Err(PermissionError::validation(
                "permissions",
                format!(
                    "{} permissions given, at most {} allowed",
                    permissions.len(),
                    self.config.max_permissions_per_grant
                ),
            ));
        }
        Ok(())
    }

    /// Find-or-create and commit for any scope shape
    async fn upsert<S>(
        &self,
        scope: S,
        permissions: &[PermissionType],
        existing: Option<Grant<S>>,
    ) -> PermissionResult<Grant<S>>
    where
        S: GrantScope,
        Grant<S>: Into<GrantChange>,
    {
        let grant = merge_or_create(existing, scope, permissions, self.clock.now());
        self.store.commit(ChangeSet::single(grant.clone())).await?;
        Ok(grant)
    }

    /// Clear `permissions` from a live row; `None` when there is nothing to revoke
    async fn strip<S>(
        &self,
        existing: Option<Grant<S>>,
        permissions: &[PermissionType],
    ) -> PermissionResult<Option<Grant<S>>>
    where
        S: GrantScope,
        Grant<S>: Into<GrantChange>,
    {
        let Some(mut grant) = existing.filter(|grant| !grant.is_deleted()) else {
            return Ok(None);
        };

        grant.remove_permissions(permissions);
        grant.touch(self.clock.now());
        self.store.commit(ChangeSet::single(grant.clone())).await?;
        Ok(Some(grant))
    }

    /// Add `permissions` to the tenant-wide grant of `subject`
    pub async fn grant(
        &self,
        subject: Subject,
        permissions: &[PermissionType],
    ) -> PermissionResult<TenantGrant> {
        self.validate_permissions(permissions)?;

        let existing = self.store.find_tenant_grant(&subject).await?;
        let grant = self.upsert(subject, permissions, existing).await?;

        info!(
            %subject,
            grant_id = %grant.id,
            permissions = %grant.permissions,
            "Granted tenant permissions"
        );
        Ok(grant)
    }

    /// Remove `permissions` from the tenant-wide grant of `subject`
    pub async fn revoke(
        &self,
        subject: Subject,
        permissions: &[PermissionType],
    ) -> PermissionResult<Option<TenantGrant>> {
        self.validate_permissions(permissions)?;

        let existing = self.store.find_tenant_grant(&subject).await?;
        let revoked = self.strip(existing, permissions).await?;

        match &revoked {
            Some(grant) => info!(
                %subject,
                grant_id = %grant.id,
                permissions = %grant.permissions,
                "Revoked tenant permissions"
            ),
            None => debug!(%subject, "No grant to revoke"),
        }
        Ok(revoked)
    }

    /// Soft-delete the tenant-wide grant of `subject`
    pub async fn revoke_all(&self, subject: Subject) -> PermissionResult<Option<TenantGrant>> {
        let Some(mut grant) = self
            .store
            .find_tenant_grant(&subject)
            .await?
            .filter(|grant| !grant.is_deleted())
        else {
            debug!(%subject, "No grant to delete");
            return Ok(None);
        };

        grant.soft_delete(self.clock.now());
        self.store.commit(ChangeSet::single(grant.clone())).await?;

        info!(%subject, grant_id = %grant.id, "Deleted tenant grant");
        Ok(Some(grant))
    }

    /// Grant the same permissions to many users of one tenant in a single commit
    ///
    /// Either every user's grant is written or none is. Repeated user ids are
    /// treated as one; the result follows the order of first appearance.
    pub async fn bulk_grant(
        &self,
        user_ids: &[UserId],
        tenant_id: TenantId,
        permissions: &[PermissionType],
    ) -> PermissionResult<Vec<TenantGrant>> {
        self.validate_permissions(permissions)?;
        if user_ids.is_empty() {
            return Err(PermissionError::validation(
                "user_ids",
                "at least one user is required",
            ));
        }

        let mut seen = HashSet::with_capacity(user_ids.len());
        let unique: Vec<UserId> = user_ids
            .iter()
            .copied()
            .filter(|user_id| seen.insert(*user_id))
            .collect();

        let mut existing: HashMap<UserId, TenantGrant> = self
            .store
            .find_tenant_grants_for_users(&unique, tenant_id)
            .await?
            .into_iter()
            .filter(|grant| !grant.is_deleted())
            .filter_map(|grant| grant.subject().user_id().map(|user_id| (user_id, grant)))
            .collect();

        let now = self.clock.now();
        let mut updates = ChangeSet::new();
        let mut creates = ChangeSet::new();
        let mut grants = Vec::with_capacity(unique.len());

        for user_id in unique {
            let subject = Subject::member(user_id, tenant_id);
            match existing.remove(&user_id) {
                Some(current) => {
                    let grant = merge_or_create(Some(current), subject, permissions, now);
                    updates.push(grant.clone().into());
                    grants.push(grant);
                }
                None => {
                    let grant = merge_or_create(None, subject, permissions, now);
                    creates.push(grant.clone().into());
                    grants.push(grant);
                }
            }
        }

        let (updated, created) = (updates.len(), creates.len());
        updates.extend(creates);
        self.store.commit(updates).await?;

        info!(
            %tenant_id,
            updated,
            created,
            "Bulk granted tenant permissions"
        );
        Ok(grants)
    }

    /// Add `permissions` for one content type
    pub async fn grant_content_type(
        &self,
        scope: ContentTypeScope,
        permissions: &[PermissionType],
    ) -> PermissionResult<ContentTypeGrant> {
        validate_content_type(&scope.content_type)?;
        self.validate_permissions(permissions)?;

        let existing = self.store.find_content_type_grant(&scope).await?;
        let grant = self.upsert(scope, permissions, existing).await?;

        info!(
            subject = %grant.scope.subject,
            content_type = %grant.scope.content_type,
            permissions = %grant.permissions,
            "Granted content type permissions"
        );
        Ok(grant)
    }

    pub async fn revoke_content_type(
        &self,
        scope: ContentTypeScope,
        permissions: &[PermissionType],
    ) -> PermissionResult<Option<ContentTypeGrant>> {
        validate_content_type(&scope.content_type)?;
        self.validate_permissions(permissions)?;

        let existing = self.store.find_content_type_grant(&scope).await?;
        let revoked = self.strip(existing, permissions).await?;

        if let Some(grant) = &revoked {
            info!(
                subject = %grant.scope.subject,
                content_type = %grant.scope.content_type,
                permissions = %grant.permissions,
                "Revoked content type permissions"
            );
        }
        Ok(revoked)
    }

    /// Add `permissions` on one resource instance
    pub async fn grant_resource<K: ResourceKind>(
        &self,
        subject: Subject,
        resource_id: &K::Id,
        permissions: &[PermissionType],
    ) -> PermissionResult<ResourceGrant> {
        self.validate_permissions(permissions)?;

        let scope = ResourceScope::of::<K>(subject, resource_id);
        let existing = self.store.find_resource_grant(&scope).await?;
        let grant = self.upsert(scope, permissions, existing).await?;

        info!(
            %subject,
            kind = K::KIND,
            resource_id = %resource_id,
            permissions = %grant.permissions,
            "Granted resource permissions"
        );
        Ok(grant)
    }

    pub async fn revoke_resource<K: ResourceKind>(
        &self,
        subject: Subject,
        resource_id: &K::Id,
        permissions: &[PermissionType],
    ) -> PermissionResult<Option<ResourceGrant>> {
        self.validate_permissions(permissions)?;

        let scope = ResourceScope::of::<K>(subject, resource_id);
        let existing = self.store.find_resource_grant(&scope).await?;
        let revoked = self.strip(existing, permissions).await?;

        if let Some(grant) = &revoked {
            info!(
                %subject,
                kind = K::KIND,
                resource_id = %resource_id,
                permissions = %grant.permissions,
                "Revoked resource permissions"
            );
        }
        Ok(revoked)
    }

    /// Share a resource with a user, optionally until `expires_at`
    ///
    /// The grant is committed first and the expiration in a second commit, so
    /// a failure in between leaves a share without an expiration.
    pub async fn share_resource<K: ResourceKind>(
        &self,
        resource_id: &K::Id,
        target_user: UserId,
        tenant_id: Option<TenantId>,
        permissions: &[PermissionType],
        expires_at: Option<DateTime<Utc>>,
    ) -> PermissionResult<ResourceGrant> {
        let subject = Subject::user(target_user, tenant_id);
        let mut grant = self
            .grant_resource::<K>(subject, resource_id, permissions)
            .await?;

        if let Some(expires_at) = expires_at {
            grant.expires_at = Some(expires_at);
            grant.touch(self.clock.now());
            self.store.commit(ChangeSet::single(grant.clone())).await?;
            debug!(grant_id = %grant.id, %expires_at, "Set share expiration");
        }

        Ok(grant)
    }
}
