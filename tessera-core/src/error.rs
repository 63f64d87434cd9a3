//! Errors shared by the Tessera crates
//!
//! Structured variants carry an [`ErrorContext`] whose `error_id` matches the
//! id logged by the component that failed, so a CLI failure can be traced
//! back to the grant store call behind it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type TesseraResult<T> = Result<T, TesseraError>;

/// Where an error happened and what the caller can do about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    /// Component that raised the error (`grant_store`, `cli`, ...)
    pub component: String,
    pub operation: Option<String>,
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

#[derive(Error, Debug)]
pub enum TesseraError {
    /// Grant store failure
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// Rejected input, from the engine or from command line arguments
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TesseraError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            TesseraError::Storage { context, .. }
            | TesseraError::Config { context, .. }
            | TesseraError::Validation { context, .. }
            | TesseraError::NotFound { context, .. } => Some(context),
            TesseraError::Io(_) | TesseraError::Serialization(_) => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            TesseraError::Storage { context, .. }
            | TesseraError::Config { context, .. }
            | TesseraError::Validation { context, .. }
            | TesseraError::NotFound { context, .. } => Some(context),
            TesseraError::Io(_) | TesseraError::Serialization(_) => None,
        }
    }

    /// Reuse a tracking id assigned by the component that failed
    pub fn with_error_id(mut self, error_id: impl Into<String>) -> Self {
        if let Some(context) = self.context_mut() {
            context.error_id = error_id.into();
        }
        self
    }

    /// Storage and IO failures may succeed on retry
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TesseraError::Storage { .. } | TesseraError::Io(_))
    }

    /// Emit the error once, at a level matching who has to act on it
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        let operation = self.context().and_then(|c| c.operation.as_deref());
        let suggestions = self
            .context()
            .map(|c| c.recovery_suggestions.join("; "))
            .unwrap_or_default();

        match self {
            TesseraError::Validation { .. } | TesseraError::NotFound { .. } => {
                warn!(error_id, operation, suggestions = %suggestions, error = %self, "Request rejected");
            }
            TesseraError::Storage { .. } | TesseraError::Io(_) => {
                warn!(error_id, operation, error = %self, "Storage failure, retry may succeed");
            }
            TesseraError::Config { .. } | TesseraError::Serialization(_) => {
                error!(error_id, operation, suggestions = %suggestions, error = %self, "Command failed");
            }
        }
    }
}

/// Grant store failure, optionally naming the failed operation
#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::TesseraError::Storage {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Retry the command"),
        }
    };
    ($msg:expr, $component:expr, $operation:expr) => {
        $crate::TesseraError::Storage {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_operation($operation)
                .with_suggestion("Retry the command")
                .with_suggestion("Check that the grant database is reachable"),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::TesseraError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'tessera config --init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::TesseraError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion(&format!("Check the value of '{}'", $field)),
        }
    };
}

#[macro_export]
macro_rules! not_found_error {
    ($resource:expr, $component:expr) => {
        $crate::TesseraError::NotFound {
            resource: $resource.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the user and tenant ids")
                .with_suggestion("Run 'tessera join' to create the membership first"),
        }
    };
}
