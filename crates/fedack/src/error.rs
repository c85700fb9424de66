//! Error types for the federation API.

use fedack_core::CoreError;
use fedack_store::StoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during federation operations.
///
/// Verification failures are not errors; they come back as values.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Identifier or key error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Batch id is not `batch-<uuid>`.
    #[error("invalid batch id: {0}")]
    InvalidBatchId(String),

    /// Batch carries more items than allowed.
    #[error("batch has {actual} items, maximum is {max}")]
    BatchTooLarge { actual: usize, max: usize },

    /// Destructive maintenance was requested without being enabled.
    #[error("destructive maintenance is disabled")]
    MaintenanceDisabled,

    /// I/O error while preparing the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for federation operations.
pub type Result<T> = std::result::Result<T, FederationError>;
