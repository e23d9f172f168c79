//! Document-store backend with emulated atomicity.

mod client;
mod rollback;

pub use client::{CRD_PREFIX, CrdClient};
pub use rollback::{CrdRollbackMgr, RollbackEntry};

use crate::backend::{BackendKind, DbBackend};
use crate::changes::{ChangeSet, RowChange};
use crate::error::MetadataResult;
use crate::row::Row;
use crate::schema::Table;
use async_trait::async_trait;
use ferrostor_storage::ObjectStore;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Backend storing one JSON document per row in an [`ObjectStore`].
///
/// Applies are serialized; each one is bracketed by a rollback entry so an
/// interrupted apply can be undone by [`recover`](DbBackend::recover).
pub struct CrdBackend {
    client: CrdClient,
    rollback: CrdRollbackMgr,
    apply_lock: Mutex<()>,
}

impl CrdBackend {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        let client = CrdClient::new(store);
        Self {
            rollback: CrdRollbackMgr::new(client.clone()),
            client,
            apply_lock: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &CrdClient {
        &self.client
    }

    pub fn rollback_mgr(&self) -> &CrdRollbackMgr {
        &self.rollback
    }

    async fn write_changes(&self, changes: &ChangeSet) -> MetadataResult<()> {
        for table_changes in changes.tables() {
            let table = table_changes.table;
            for (key, change) in &table_changes.rows {
                match change {
                    RowChange::Create(row) => self.client.create_row(table, key, row).await?,
                    RowChange::Update(row) => self.client.update_row(table, key, row).await?,
                    RowChange::Delete(_) => self.client.delete_row(table, key).await?,
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DbBackend for CrdBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Crd
    }

    async fn migrate(&self) -> MetadataResult<()> {
        // Documents are created on demand; there is no schema to install.
        self.health_check().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.client.store().health_check().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(backend = "crd", table = table.name))]
    async fn load_table(&self, table: &'static Table) -> MetadataResult<Vec<Row>> {
        self.client.list_rows(table).await
    }

    #[tracing::instrument(skip(self, changes), fields(backend = "crd", rows = changes.len()))]
    async fn apply(&self, changes: &ChangeSet) -> MetadataResult<()> {
        let _serialized = self.apply_lock.lock().await;

        // A leftover entry must be replayed before a new one may be written.
        self.rollback.rollback_if_needed().await?;

        let Some(entry_id) = self.rollback.create_rollback_entry(changes).await? else {
            return Ok(());
        };

        if let Err(err) = self.write_changes(changes).await {
            tracing::warn!(entry = %entry_id, error = %err, "apply failed, rolling back");
            if let Err(recovery_err) = self.rollback.rollback_if_needed().await {
                tracing::error!(
                    entry = %entry_id,
                    error = %recovery_err,
                    "rollback after failed apply failed; entry is left for startup recovery"
                );
            }
            return Err(err);
        }

        self.rollback.cleanup(&entry_id).await
    }

    async fn recover(&self) -> MetadataResult<bool> {
        let _serialized = self.apply_lock.lock().await;
        self.rollback.rollback_if_needed().await
    }
}
