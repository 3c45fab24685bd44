//! Error types for the migration engine
//!
//! Scan, generation, state and execution failures all surface through
//! [`MigrationError`]. Script failures inside an `apply` run are not returned
//! as errors; they are carried by the run's `ExecutionResult` so the caller
//! can see which migrations were already recorded.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised by the migration engine
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Duplicate identifier {identifier} in group {group}: {} and {}", .first.display(), .second.display())]
    DuplicateIdentifier {
        group: String,
        identifier: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Migration already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Migration group not found: {}", .0.display())]
    GroupNotFound(PathBuf),

    #[error("No migration group could be resolved; pass --group or create one first")]
    UnresolvedGroup,

    #[error("Invalid migration name: {0:?}")]
    InvalidName(String),

    #[error("Migration {identifier} not found in group {group}")]
    UnknownTarget { group: String, identifier: String },

    #[error("Migration {identifier} failed: {message}")]
    ScriptExecution { identifier: String, message: String },

    #[error("Migration {0} has no DOWN section and cannot be reverted")]
    Irreversible(String),

    #[error("State store unavailable: {0}")]
    StateStoreUnavailable(String),

    #[error("State store error: {0}")]
    StateStore(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}

impl From<toml::de::Error> for MigrationError {
    fn from(err: toml::de::Error) -> Self {
        MigrationError::Configuration(err.to_string())
    }
}
