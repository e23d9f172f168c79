//! Metadata error types.

use thiserror::Error;

/// Metadata operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(#[from] ferrostor_storage::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] ferrostor_core::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// A broken internal invariant. Never caused by user input.
    #[error("implementation error: {0}")]
    Implementation(String),
}

impl MetadataError {
    pub fn implementation(msg: impl Into<String>) -> Self {
        Self::Implementation(msg.into())
    }

    pub fn is_implementation_error(&self) -> bool {
        matches!(self, Self::Implementation(_))
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
