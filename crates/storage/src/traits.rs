//! The object store seam.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Flat key/value store holding one document per persisted row.
///
/// Keys are relative paths separated by `/`. A write replaces the object as a
/// whole, so a reader sees either the previous document or the new one.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Fails with [`StorageError::NotFound`](crate::StorageError::NotFound) for unknown keys.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Write only when the key is free. Returns `false` if something is already stored.
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool>;

    /// Fails with [`StorageError::NotFound`](crate::StorageError::NotFound) for unknown keys.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Every key below `prefix`, unordered.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    fn backend_name(&self) -> &'static str;

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
