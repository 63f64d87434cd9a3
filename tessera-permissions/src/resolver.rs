//! Hierarchical permission resolution
//!
//! Single-permission checks walk from the most specific grant to the most
//! general one and stop at the first valid grant that holds the bit:
//! the user's own grant, then the tenant default, then the global default.
//! Effective-permission queries instead take the union of all three levels.

use crate::clock::Clock;
use crate::error::{PermissionError, PermissionResult};
use crate::grant::{ContentTypeScope, ResourceKind, ResourceScope, Subject};
use crate::permission::{PermissionSet, PermissionType};
use crate::storage::GrantStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tessera_core::{TenantId, UserId};
use tracing::{debug, warn};

/// Subjects consulted for `(user, tenant)`, most specific first
pub fn fallback_chain(user_id: Option<UserId>, tenant_id: Option<TenantId>) -> Vec<Subject> {
    let mut chain = Vec::with_capacity(3);
    if let Some(user_id) = user_id {
        chain.push(Subject::User { user_id, tenant_id });
    }
    if let Some(tenant_id) = tenant_id {
        chain.push(Subject::tenant_default(tenant_id));
    }
    chain.push(Subject::GlobalDefault);
    chain
}

pub(crate) fn validate_content_type(content_type: &str) -> PermissionResult<()> {
    if content_type.trim().is_empty() {
        return Err(PermissionError::validation(
            "content_type",
            "content type name must not be empty",
        ));
    }
    Ok(())
}

/// Read-only permission resolver
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn GrantStore>,
    clock: Arc<dyn Clock>,
}

impl Resolver {
    pub fn new(store: Arc<dyn GrantStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Does `user` (or the defaults, when `user` is `None`) hold `permission`
    /// in `tenant`?
    pub async fn has_permission(
        &self,
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
        permission: PermissionType,
    ) -> PermissionResult<bool> {
        let now = self.clock.now();

        for subject in fallback_chain(user_id, tenant_id) {
            if let Some(grant) = self.store.find_tenant_grant(&subject).await? {
                if grant.allows(permission, now) {
                    debug!(%subject, %permission, "Permission granted");
                    return Ok(true);
                }
            }
        }

        debug!(?user_id, ?tenant_id, %permission, "Permission not granted at any level");
        Ok(false)
    }

    /// Union of the global default, the tenant default and the user's grant
    pub async fn effective_permissions(
        &self,
        user_id: UserId,
        tenant_id: Option<TenantId>,
    ) -> PermissionResult<BTreeSet<PermissionType>> {
        let now = self.clock.now();
        let mut effective = PermissionSet::empty();

        for subject in fallback_chain(Some(user_id), tenant_id) {
            if let Some(grant) = self.store.find_tenant_grant(&subject).await? {
                if grant.is_valid_at(now) {
                    effective = effective.union(grant.permissions);
                }
            }
        }

        Ok(effective.permissions())
    }

    /// Content-type check; without any valid content-type grant on the chain
    /// the tenant-wide answer is used instead
    pub async fn has_content_type_permission(
        &self,
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
        content_type: &str,
        permission: PermissionType,
    ) -> PermissionResult<bool> {
        validate_content_type(content_type)?;
        let now = self.clock.now();
        let mut found_any = false;

        for subject in fallback_chain(user_id, tenant_id) {
            let scope = ContentTypeScope::new(subject, content_type);
            if let Some(grant) = self.store.find_content_type_grant(&scope).await? {
                if !grant.is_valid_at(now) {
                    continue;
                }
                found_any = true;
                if grant.permissions.contains(permission) {
                    debug!(%subject, content_type, %permission, "Content type permission granted");
                    return Ok(true);
                }
            }
        }

        if found_any {
            return Ok(false);
        }

        debug!(content_type, "No content type grants, using tenant permissions");
        self.has_permission(user_id, tenant_id, permission).await
    }

    /// Direct lookup of a resource share; no hierarchy is consulted
    pub async fn has_resource_permission<K: ResourceKind>(
        &self,
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
        resource_id: &K::Id,
        permission: PermissionType,
    ) -> PermissionResult<bool> {
        let scope = ResourceScope::of::<K>(Subject::from_parts(user_id, tenant_id), resource_id);
        let now = self.clock.now();

        let allowed = self
            .store
            .find_resource_grant(&scope)
            .await?
            .is_some_and(|grant| grant.allows(permission, now));

        debug!(
            kind = K::KIND,
            resource_id = %resource_id,
            %permission,
            allowed,
            "Resource permission resolved"
        );
        Ok(allowed)
    }

    /// Resource share, then the content type named after the resource kind,
    /// then tenant permissions. A failed share lookup falls through to the
    /// next layer instead of failing the check.
    pub async fn can_access_resource<K: ResourceKind>(
        &self,
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
        resource_id: &K::Id,
        permission: PermissionType,
    ) -> PermissionResult<bool> {
        match self
            .has_resource_permission::<K>(user_id, tenant_id, resource_id, permission)
            .await
        {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => {
                warn!(
                    kind = K::KIND,
                    resource_id = %resource_id,
                    error = %e,
                    "Resource grant lookup failed, falling back to content type permissions"
                );
            }
        }

        self.has_content_type_permission(user_id, tenant_id, K::KIND, permission)
            .await
    }

    /// A valid per-user-per-tenant grant exists
    pub async fn is_member(&self, user_id: UserId, tenant_id: TenantId) -> PermissionResult<bool> {
        let now = self.clock.now();
        Ok(self
            .store
            .find_tenant_grant(&Subject::member(user_id, tenant_id))
            .await?
            .is_some_and(|grant| grant.is_valid_at(now)))
    }
}
