//! Grant records and their scopes
//!
//! A grant binds a [`Subject`] within some scope to a [`PermissionSet`] and
//! a validity window. Three scope shapes exist: tenant-wide ([`Subject`]
//! alone), content-type ([`ContentTypeScope`]) and resource
//! ([`ResourceScope`]).

use crate::permission::{PermissionSet, PermissionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{TenantId, UserId};
use uuid::Uuid;

/// Who a grant applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    /// A specific user, optionally inside a tenant. With a tenant this is
    /// also the user's membership record.
    User {
        user_id: UserId,
        tenant_id: Option<TenantId>,
    },
    /// Fallback for every user of one tenant
    TenantDefault { tenant_id: TenantId },
    /// Platform-wide fallback
    GlobalDefault,
}

impl Subject {
    /// Build a subject from nullable parts: a missing user means a default grant
    pub fn from_parts(user_id: Option<UserId>, tenant_id: Option<TenantId>) -> Self {
        match (user_id, tenant_id) {
            (Some(user_id), tenant_id) => Subject::User { user_id, tenant_id },
            (None, Some(tenant_id)) => Subject::TenantDefault { tenant_id },
            (None, None) => Subject::GlobalDefault,
        }
    }

    pub fn user(user_id: UserId, tenant_id: Option<TenantId>) -> Self {
        Subject::User { user_id, tenant_id }
    }

    /// Per-user-per-tenant subject
    pub fn member(user_id: UserId, tenant_id: TenantId) -> Self {
        Subject::User {
            user_id,
            tenant_id: Some(tenant_id),
        }
    }

    pub fn tenant_default(tenant_id: TenantId) -> Self {
        Subject::TenantDefault { tenant_id }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Subject::User { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Subject::User { tenant_id, .. } => *tenant_id,
            Subject::TenantDefault { tenant_id } => Some(*tenant_id),
            Subject::GlobalDefault => None,
        }
    }

    pub fn is_default(&self) -> bool {
        !matches!(self, Subject::User { .. })
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::User {
                user_id,
                tenant_id: Some(tenant_id),
            } => write!(f, "user:{}@tenant:{}", user_id, tenant_id),
            Subject::User {
                user_id,
                tenant_id: None,
            } => write!(f, "user:{}", user_id),
            Subject::TenantDefault { tenant_id } => write!(f, "default@tenant:{}", tenant_id),
            Subject::GlobalDefault => write!(f, "default@global"),
        }
    }
}

/// Anything a grant can be scoped to
pub trait GrantScope: Clone + fmt::Debug + Send + Sync + 'static {
    fn subject(&self) -> &Subject;
}

impl GrantScope for Subject {
    fn subject(&self) -> &Subject {
        self
    }
}

/// A subject restricted to one named content type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentTypeScope {
    pub subject: Subject,
    pub content_type: String,
}

impl ContentTypeScope {
    pub fn new<C: Into<String>>(subject: Subject, content_type: C) -> Self {
        Self {
            subject,
            content_type: content_type.into(),
        }
    }
}

impl GrantScope for ContentTypeScope {
    fn subject(&self) -> &Subject {
        &self.subject
    }
}

/// A kind of protected resource, supplied by the caller
///
/// The caller picks the kind name and the id type. The stored record is
/// always a [`ResourceGrant`]: the id is kept in its `Display` form next to
/// [`ResourceKind::KIND`], and kinds cannot add columns of their own.
///
/// ```
/// use tessera_permissions::ResourceKind;
///
/// struct Document;
///
/// impl ResourceKind for Document {
///     const KIND: &'static str = "document";
///     type Id = uuid::Uuid;
/// }
/// ```
pub trait ResourceKind: Send + Sync + 'static {
    /// Stable name stored with every grant of this kind. Also used as the
    /// content type name when resource checks fall back to content types.
    const KIND: &'static str;

    type Id: fmt::Display + Send + Sync + ?Sized;
}

/// A subject restricted to one resource instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceScope {
    pub subject: Subject,
    pub resource_kind: String,
    pub resource_id: String,
}

impl ResourceScope {
    pub fn of<K: ResourceKind>(subject: Subject, resource_id: &K::Id) -> Self {
        Self {
            subject,
            resource_kind: K::KIND.to_string(),
            resource_id: resource_id.to_string(),
        }
    }
}

impl GrantScope for ResourceScope {
    fn subject(&self) -> &Subject {
        &self.subject
    }
}

/// A stored permission grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant<S> {
    pub id: Uuid,
    pub scope: S,
    pub permissions: PermissionSet,
    /// `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Soft revocation marker
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type TenantGrant = Grant<Subject>;
pub type ContentTypeGrant = Grant<ContentTypeScope>;
pub type ResourceGrant = Grant<ResourceScope>;

impl<S: GrantScope> Grant<S> {
    pub fn new(scope: S, permissions: PermissionSet, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            permissions,
            expires_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn subject(&self) -> &Subject {
        self.scope.subject()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Not deleted and not expired
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_deleted() && !self.is_expired_at(now)
    }

    /// Valid and holding `permission`
    pub fn allows(&self, permission: PermissionType, now: DateTime<Utc>) -> bool {
        self.is_valid_at(now) && self.permissions.contains(permission)
    }

    pub fn add_permissions(&mut self, permissions: &[PermissionType]) {
        self.permissions.extend(permissions.iter().copied());
    }

    pub fn remove_permissions(&mut self, permissions: &[PermissionType]) {
        for permission in permissions {
            self.permissions.remove(*permission);
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.touch(now);
    }
}
