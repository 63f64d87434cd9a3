//! Permission engine error types
//!
//! Validation failures are raised before any store access. Store failures
//! carry the failing operation and a tracking id and are never swallowed by
//! the mutator.

use serde::{Deserialize, Serialize};
use tessera_core::{config_error, not_found_error, storage_error, validation_error, TesseraError};
use thiserror::Error;

/// Permission operation result type
pub type PermissionResult<T> = Result<T, PermissionError>;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details")]
pub enum PermissionError {
    /// Rejected input
    #[error("Validation failed for {field}: {message}")]
    Validation { message: String, field: String },

    /// A record the operation requires does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Failure reported by the grant store
    #[error("Store error during {operation}: {message}")]
    Store {
        message: String,
        operation: String,
        error_id: String,
    },

    /// Invalid engine configuration
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PermissionError {
    pub fn validation<M: Into<String>, F: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.into(),
        }
    }

    pub fn not_found<R: Into<String>>(resource: R) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Wrap a backend failure
    pub fn store<O: Into<String>, E: std::fmt::Display>(operation: O, error: E) -> Self {
        Self::Store {
            message: error.to_string(),
            operation: operation.into(),
            error_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Store failures may succeed on retry; everything else will not
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Store { .. } => "store",
            Self::Config { .. } => "config",
        }
    }

    /// Convert to HTTP status code
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Store { .. } => 503,
            Self::Config { .. } => 500,
        }
    }
}

impl From<PermissionError> for TesseraError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::Validation { message, field } => {
                validation_error!(message, field, "permissions")
            }
            PermissionError::NotFound { resource } => not_found_error!(resource, "permissions"),
            PermissionError::Store {
                message,
                operation,
                error_id,
            } => storage_error!(message, "grant_store", &operation).with_error_id(error_id),
            PermissionError::Config { message } => config_error!(message, "permissions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let store = PermissionError::store("commit", "disk I/O error");
        assert!(store.is_recoverable());
        assert_eq!(store.category(), "store");
        assert_eq!(store.http_status(), 503);

        let validation = PermissionError::validation("permissions", "must not be empty");
        assert!(!validation.is_recoverable());
        assert_eq!(validation.http_status(), 400);
        assert!(validation.to_string().contains("permissions"));
    }

    #[test]
    fn test_store_error_keeps_tracking_id_in_core_error() {
        let err = PermissionError::store("find_tenant_grant", "timeout");
        let PermissionError::Store { error_id, .. } = &err else {
            panic!("Expected Store error");
        };
        let error_id = error_id.clone();

        let core: TesseraError = err.into();
        let context = core.context().unwrap();
        assert_eq!(context.error_id, error_id);
        assert_eq!(context.operation.as_deref(), Some("find_tenant_grant"));
    }

    #[test]
    fn test_engine_errors_map_onto_core_variants() {
        let core: TesseraError = PermissionError::validation("content_type", "must not be blank").into();
        match &core {
            TesseraError::Validation { field, context, .. } => {
                assert_eq!(field.as_deref(), Some("content_type"));
                assert_eq!(context.component, "permissions");
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
        assert!(!core.is_recoverable());

        let core: TesseraError = PermissionError::not_found("membership").into();
        let context = core.context().unwrap();
        assert!(matches!(core, TesseraError::NotFound { .. }));
        assert!(context
            .recovery_suggestions
            .iter()
            .any(|s| s.contains("tessera join")));

        let core: TesseraError = PermissionError::config("unknown permission 'fly'").into();
        assert!(matches!(core, TesseraError::Config { .. }));
    }
}
