//! Engine configuration

use crate::error::{PermissionError, PermissionResult};
use crate::permission::{PermissionSet, PermissionType, PERMISSION_SLOTS};
use tessera_core::PermissionSettings;

/// Resolved settings for the permission engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Largest permission list accepted by one grant or revoke call
    pub max_permissions_per_grant: usize,
    /// Exact permission set given to a user joining or rejoining a tenant
    pub member_default_permissions: PermissionSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_permissions_per_grant: 32,
            member_default_permissions: [PermissionType::Read].into_iter().collect(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_permissions_per_grant(mut self, max: usize) -> Self {
        self.max_permissions_per_grant = max;
        self
    }

    pub fn with_member_defaults<I: IntoIterator<Item = PermissionType>>(mut self, defaults: I) -> Self {
        self.member_default_permissions = defaults.into_iter().collect();
        self
    }

    /// Build from the `[permissions]` section of the configuration file
    pub fn from_settings(settings: &PermissionSettings) -> PermissionResult<Self> {
        let max = settings.max_permissions_per_grant;
        if max == 0 || max > PERMISSION_SLOTS as usize {
            return Err(PermissionError::config(format!(
                "max_permissions_per_grant must be between 1 and {}, got {}",
                PERMISSION_SLOTS, max
            )));
        }

        let member_default_permissions = settings
            .member_default_permissions
            .iter()
            .map(|name| name.parse::<PermissionType>())
            .collect::<Result<PermissionSet, _>>()
            .map_err(PermissionError::config)?;

        if member_default_permissions.is_empty() {
            return Err(PermissionError::config(
                "member_default_permissions must name at least one permission",
            ));
        }

        Ok(Self {
            max_permissions_per_grant: max,
            member_default_permissions,
        })
    }
}
