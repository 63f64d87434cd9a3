//! Integration tests for tessera-core infrastructure

use tessera_core::{
    config_error, not_found_error, storage_error, validation_error, LogFormat,
    LoggingConfig, StorageBackend, TesseraConfig, TesseraError,
};

#[test]
fn test_error_handling() {
    let error = storage_error!("database is locked", "grant_store", "commit");

    match &error {
        TesseraError::Storage { message, context } => {
            assert_eq!(message, "database is locked");
            assert_eq!(context.component, "grant_store");
            assert_eq!(context.operation.as_deref(), Some("commit"));
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected Storage error"),
    }

    // Should not panic without a subscriber
    error.log();
    assert!(error.is_recoverable());

    let config_error = config_error!("Invalid config", "test");
    config_error.log();
    assert!(!config_error.is_recoverable());
}

#[test]
fn test_error_macros() {
    let validation_err = validation_error!("Invalid field value", "permissions", "validator");
    match validation_err {
        TesseraError::Validation {
            message,
            field,
            context,
        } => {
            assert_eq!(message, "Invalid field value");
            assert_eq!(field, Some("permissions".to_string()));
            assert_eq!(context.component, "validator");
            assert!(!context.recovery_suggestions.is_empty());
        }
        _ => panic!("Expected Validation error"),
    }

    let not_found_err = not_found_error!("membership", "membership_manager");
    match not_found_err {
        TesseraError::NotFound { resource, context } => {
            assert_eq!(resource, "membership");
            assert_eq!(context.component, "membership_manager");
            assert!(!context.recovery_suggestions.is_empty());
        }
        _ => panic!("Expected NotFound error"),
    }
}

#[test]
fn test_error_id_is_carried_over() {
    let error = storage_error!("timeout", "grant_store").with_error_id("store-42");
    assert_eq!(error.context().map(|c| c.error_id.as_str()), Some("store-42"));

    // Wrapped errors have no context to carry an id
    let io = TesseraError::from(std::io::Error::other("disk full")).with_error_id("io-1");
    assert!(io.context().is_none());
    assert!(io.is_recoverable());
}

#[test]
fn test_config_validation() {
    let mut config = TesseraConfig::default();
    assert!(config.validate().is_ok());

    config.permissions.max_permissions_per_grant = 0;
    match config.validate().unwrap_err() {
        TesseraError::Config { message, .. } => {
            assert!(message.contains("max_permissions_per_grant"));
        }
        _ => panic!("Expected Config error"),
    }

    config.permissions.max_permissions_per_grant = 129;
    assert!(config.validate().is_err());

    config.permissions.max_permissions_per_grant = 16;
    config.permissions.member_default_permissions.clear();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.toml");

    let mut config = TesseraConfig::default();
    config.storage.backend = StorageBackend::Memory;
    config.permissions.member_default_permissions = vec!["read".into(), "comment".into()];
    config.save_to_file(&path).unwrap();

    let loaded = TesseraConfig::from_file(&path).unwrap();
    assert_eq!(loaded.storage.backend, StorageBackend::Memory);
    assert_eq!(
        loaded.permissions.member_default_permissions,
        vec!["read".to_string(), "comment".to_string()]
    );
}

#[test]
fn test_partial_config_uses_defaults() {
    let config = TesseraConfig::from_toml_str(
        r#"
        [permissions]
        max_permissions_per_grant = 8

        [logging]
        format = "json"
        "#,
    )
    .unwrap();

    assert_eq!(config.permissions.max_permissions_per_grant, 8);
    assert_eq!(config.permissions.member_default_permissions, vec!["read"]);
    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.level, LoggingConfig::default().level);
}

#[test]
fn test_missing_config_file_is_config_error() {
    let result = TesseraConfig::from_file("/definitely/not/here/tessera.toml");
    assert!(matches!(result, Err(TesseraError::Config { .. })));
}
