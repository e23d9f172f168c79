//! Transactional persistence for the ferrostor controller.
//!
//! This crate provides:
//! - A table-driven schema registry and a generic row codec
//! - Change sets and the [`TransactionMgr`] with transactional containers
//! - A SQL backend (SQLite) with native transactions
//! - A document backend (CRD-style) with rollback entries for atomicity
//! - Persisted property containers

pub mod backend;
pub mod changes;
pub mod crd;
pub mod error;
pub mod models;
pub mod props;
pub mod row;
pub mod schema;
pub mod sql;
pub mod tx;

pub use backend::{BackendKind, DbBackend};
pub use changes::{ChangeSet, RowChange, TableChanges};
pub use crd::{CrdBackend, CrdRollbackMgr, RollbackEntry};
pub use error::{MetadataError, MetadataResult};
pub use models::TableRow;
pub use props::PropsContainer;
pub use row::{DbValue, Row};
pub use schema::{Table, table_by_name};
pub use sql::SqlBackend;
pub use tx::{TransactionMgr, TransactionMgrFactory, TransactionObject, TxCell, TxId, TxMap};

use ferrostor_core::config::MetadataConfig;
use std::sync::Arc;

/// Create the metadata backend from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn DbBackend>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let backend = SqlBackend::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(backend) as Arc<dyn DbBackend>)
        }
        MetadataConfig::Crd { storage } => {
            tracing::info!(storage = ?storage, "using document metadata backend");
            let store = ferrostor_storage::from_config(storage).await?;
            Ok(Arc::new(CrdBackend::new(store)) as Arc<dyn DbBackend>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrostor_core::config::{MetadataConfig, StorageConfig};

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("metadata.db");
        let config = MetadataConfig::Sqlite {
            path: db_path.clone(),
            query_timeout_secs: None,
        };

        let backend = from_config(&config).await.unwrap();
        backend.health_check().await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Sql);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_from_config_crd_memory() {
        let config = MetadataConfig::Crd {
            storage: StorageConfig::Memory,
        };
        let backend = from_config(&config).await.unwrap();
        backend.migrate().await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Crd);
        assert!(!backend.recover().await.unwrap());
    }
}
