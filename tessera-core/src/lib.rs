//! Tessera Core - shared infrastructure for the Tessera permission engine
//!
//! Error types with context, TOML configuration, logging setup and the
//! identifier types used by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// Used by the logging macros
pub use tracing;
