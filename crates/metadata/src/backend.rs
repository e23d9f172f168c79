//! Persistence backend seam.

use crate::changes::ChangeSet;
use crate::error::MetadataResult;
use crate::row::Row;
use crate::schema::Table;
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Relational engine with native multi-statement transactions.
    Sql,
    /// Document store without multi-row atomicity; emulated via rollback entries.
    Crd,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sql => f.write_str("sql"),
            BackendKind::Crd => f.write_str("crd"),
        }
    }
}

/// Storage engine behind a [`TransactionMgr`](crate::TransactionMgr).
#[async_trait]
pub trait DbBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Create or upgrade the storage layout.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check connectivity.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Load every row of a table.
    async fn load_table(&self, table: &'static Table) -> MetadataResult<Vec<Row>>;

    /// Apply all changes atomically: either every change is persisted or none is.
    ///
    /// Creating an existing row fails with `AlreadyExists`; updating or deleting a
    /// missing row fails with `NotFound`.
    async fn apply(&self, changes: &ChangeSet) -> MetadataResult<()>;

    /// Undo the effects of an apply that was interrupted by a crash.
    ///
    /// Returns whether anything was rolled back.
    async fn recover(&self) -> MetadataResult<bool> {
        Ok(false)
    }
}
