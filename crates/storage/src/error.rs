//! Object store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// No object is stored under the key.
    #[error("no object at key {0}")]
    NotFound(String),

    /// The key is empty, absolute, or leaves the store's namespace.
    #[error("rejected object key: {0}")]
    InvalidKey(String),

    #[error("object store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid object store configuration: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
