//! Tenant membership lifecycle
//!
//! A membership is the tenant-wide grant of a `(user, tenant)` pair. It moves
//! between three states:
//!
//! - non-member: no row
//! - member: valid row
//! - left or expired: row that is soft-deleted or past `expires_at`
//!
//! Joining from the last state reactivates the existing row instead of
//! creating a second one.

use crate::clock::Clock;
use crate::error::{PermissionError, PermissionResult};
use crate::grant::{Grant, Subject, TenantGrant};
use crate::permission::PermissionSet;
use crate::storage::{ChangeSet, GrantStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tessera_core::{TenantId, UserId};
use tracing::{debug, info};

#[derive(Clone)]
pub struct MembershipManager {
    store: Arc<dyn GrantStore>,
    clock: Arc<dyn Clock>,
    default_permissions: PermissionSet,
}

impl MembershipManager {
    pub fn new(
        store: Arc<dyn GrantStore>,
        clock: Arc<dyn Clock>,
        default_permissions: PermissionSet,
    ) -> Self {
        Self {
            store,
            clock,
            default_permissions,
        }
    }

    /// Permissions a (re)joining member starts with
    pub fn default_permissions(&self) -> PermissionSet {
        self.default_permissions
    }

    /// Join `tenant`, reactivating a previous membership if there is one
    ///
    /// A reactivated membership loses every permission it held before and
    /// starts again from the default set.
    pub async fn join(&self, user_id: UserId, tenant_id: TenantId) -> PermissionResult<TenantGrant> {
        let subject = Subject::member(user_id, tenant_id);
        let now = self.clock.now();

        let grant = match self.store.find_tenant_grant(&subject).await? {
            Some(grant) if grant.is_valid_at(now) => {
                debug!(%subject, "Already a member");
                return Ok(grant);
            }
            Some(mut grant) => {
                grant.expires_at = None;
                grant.deleted_at = None;
                grant.permissions = self.default_permissions;
                grant.touch(now);
                info!(%subject, grant_id = %grant.id, "Reactivated membership");
                grant
            }
            None => {
                let grant = Grant::new(subject, self.default_permissions, now);
                info!(%subject, grant_id = %grant.id, "Created membership");
                grant
            }
        };

        self.store.commit(ChangeSet::single(grant.clone())).await?;
        Ok(grant)
    }

    /// Leave `tenant` by expiring the membership now; no-op for non-members
    pub async fn leave(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> PermissionResult<Option<TenantGrant>> {
        let subject = Subject::member(user_id, tenant_id);
        let now = self.clock.now();

        let Some(mut grant) = self
            .store
            .find_tenant_grant(&subject)
            .await?
            .filter(|grant| grant.is_valid_at(now))
        else {
            debug!(%subject, "Not a member, nothing to leave");
            return Ok(None);
        };

        grant.expires_at = Some(now);
        grant.touch(now);
        self.store.commit(ChangeSet::single(grant.clone())).await?;

        info!(%subject, grant_id = %grant.id, "Left tenant");
        Ok(Some(grant))
    }

    pub async fn is_member(&self, user_id: UserId, tenant_id: TenantId) -> PermissionResult<bool> {
        let now = self.clock.now();
        Ok(self
            .store
            .find_tenant_grant(&Subject::member(user_id, tenant_id))
            .await?
            .is_some_and(|grant| grant.is_valid_at(now)))
    }

    /// Overwrite the expiration of an existing membership row
    ///
    /// Expired rows qualify, so this can extend a lapsed membership without
    /// resetting its permissions. Soft-deleted rows do not.
    pub async fn update_expiration(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        expires_at: Option<DateTime<Utc>>,
    ) -> PermissionResult<TenantGrant> {
        let subject = Subject::member(user_id, tenant_id);

        let mut grant = self
            .store
            .find_tenant_grant(&subject)
            .await?
            .filter(|grant| !grant.is_deleted())
            .ok_or_else(|| PermissionError::not_found(format!("membership {}", subject)))?;

        grant.expires_at = expires_at;
        grant.touch(self.clock.now());
        self.store.commit(ChangeSet::single(grant.clone())).await?;

        info!(%subject, ?expires_at, "Updated membership expiration");
        Ok(grant)
    }

    /// Valid memberships of `user`, oldest first
    pub async fn list_tenants_for_user(&self, user_id: UserId) -> PermissionResult<Vec<TenantGrant>> {
        let now = self.clock.now();
        Ok(self
            .store
            .list_user_tenant_grants(user_id)
            .await?
            .into_iter()
            .filter(|grant| grant.is_valid_at(now))
            .collect())
    }
}
