//! Tessera Permissions - hierarchical permission resolution
//!
//! Permissions are stored as compact bitmask grants at three levels and
//! resolved by falling back from narrow to broad scopes:
//!
//! - **Tenant-wide grants**: per user in a tenant, a tenant default and a
//!   global default. A per-user-per-tenant grant doubles as membership.
//! - **Content-type grants**: the same hierarchy restricted to one content
//!   type, falling back to tenant-wide grants when none apply.
//! - **Resource grants**: point shares on one resource instance, optionally
//!   expiring.
//!
//! ## Architecture
//!
//! - [`Resolver`]: read-only permission and membership queries
//! - [`GrantMutator`]: grant, revoke, bulk grant and share
//! - [`MembershipManager`]: join, leave and expiration of memberships
//! - [`GrantStore`]: persistence, with memory and SQLite backends
//! - [`PermissionService`]: one facade over all of the above
//!
//! ```no_run
//! use tessera_core::{TenantId, UserId};
//! use tessera_permissions::{PermissionService, PermissionType, Subject};
//!
//! # async fn example() -> tessera_permissions::PermissionResult<()> {
//! let service = PermissionService::new();
//! let tenant = TenantId::new();
//! let user = UserId::new();
//!
//! service
//!     .grant(Subject::tenant_default(tenant), &[PermissionType::Read])
//!     .await?;
//! assert!(service
//!     .has_permission(Some(user), Some(tenant), PermissionType::Read)
//!     .await?);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod grant;
pub mod membership;
pub mod mutator;
pub mod permission;
pub mod resolver;
pub mod service;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{PermissionError, PermissionResult};
pub use grant::{
    ContentTypeGrant, ContentTypeScope, Grant, GrantScope, ResourceGrant, ResourceKind,
    ResourceScope, Subject, TenantGrant,
};
pub use membership::MembershipManager;
pub use mutator::GrantMutator;
pub use permission::{PermissionSet, PermissionType, PermissionWords};
pub use resolver::Resolver;
pub use service::{open_store, PermissionService, PermissionServiceBuilder};
#[cfg(feature = "sqlite")]
pub use storage::SqliteGrantStore;
pub use storage::{ChangeSet, GrantChange, GrantStore, MemoryGrantStore};
