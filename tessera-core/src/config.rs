//! Configuration management

use crate::error::{TesseraError, TesseraResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound imposed by the 128-slot permission bitmask
pub const MAX_PERMISSION_SLOTS: usize = 128;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TesseraConfig {
    #[serde(default)]
    pub permissions: PermissionSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Permission engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSettings {
    /// Largest permission list accepted by a single grant or revoke call
    pub max_permissions_per_grant: usize,
    /// Permission names assigned to a user when they join (or rejoin) a tenant
    pub member_default_permissions: Vec<String>,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            max_permissions_per_grant: 32,
            member_default_permissions: vec!["read".to_string()],
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Grant storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// sqlx connection URL, used by the sqlite backend
    pub database_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_url: "sqlite://tessera.db?mode=rwc".to_string(),
        }
    }
}

impl TesseraConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> TesseraResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TesseraError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> TesseraResult<Self> {
        let config: TesseraConfig = toml::from_str(content).map_err(|e| TesseraError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> TesseraResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TesseraError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| TesseraError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> TesseraResult<()> {
        let max = self.permissions.max_permissions_per_grant;
        if max == 0 || max > MAX_PERMISSION_SLOTS {
            return Err(TesseraError::Config {
                message: format!(
                    "permissions.max_permissions_per_grant must be between 1 and {}, got {}",
                    MAX_PERMISSION_SLOTS, max
                ),
                source: None,
                context: crate::ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set permissions.max_permissions_per_grant to a value in range"),
            });
        }

        if self.permissions.member_default_permissions.is_empty() {
            return Err(TesseraError::Config {
                message: "permissions.member_default_permissions must not be empty".to_string(),
                source: None,
                context: crate::ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("List at least one permission, e.g. [\"read\"]"),
            });
        }

        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.database_url.trim().is_empty()
        {
            return Err(TesseraError::Config {
                message: "storage.database_url is required for the sqlite backend".to_string(),
                source: None,
                context: crate::ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set storage.database_url, e.g. sqlite://tessera.db?mode=rwc"),
            });
        }

        Ok(())
    }
}
