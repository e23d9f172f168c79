//! Undo log for the document backend.
//!
//! The object store has no multi-document transaction, so before a change set
//! is written the current state of every affected row is saved in a rollback
//! entry. A successful apply deletes the entry. An entry found later means an
//! apply was interrupted; [`CrdRollbackMgr::rollback_if_needed`] replays it to
//! restore the state from before that apply.

use super::client::{CRD_PREFIX, CrdClient};
use crate::changes::ChangeSet;
use crate::error::{MetadataError, MetadataResult};
use crate::row::Row;
use crate::schema::table_by_name;
use bytes::Bytes;
use ferrostor_storage::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Pre-image of one interrupted apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackEntry {
    /// Rows that did not exist before the apply; undone by deleting them.
    pub created_keys: BTreeMap<String, BTreeSet<String>>,
    /// Rows that existed before the apply; undone by writing the saved contents back.
    pub updated_or_deleted_rows: BTreeMap<String, BTreeMap<String, Row>>,
}

impl RollbackEntry {
    pub fn is_empty(&self) -> bool {
        self.created_keys.values().all(BTreeSet::is_empty)
            && self.updated_or_deleted_rows.values().all(BTreeMap::is_empty)
    }

    /// Number of (table, key) pairs this entry undoes.
    pub fn len(&self) -> usize {
        self.created_keys.values().map(BTreeSet::len).sum::<usize>()
            + self
                .updated_or_deleted_rows
                .values()
                .map(BTreeMap::len)
                .sum::<usize>()
    }
}

pub struct CrdRollbackMgr {
    client: CrdClient,
}

impl CrdRollbackMgr {
    pub fn new(client: CrdClient) -> Self {
        Self { client }
    }

    fn entry_prefix() -> String {
        format!("{CRD_PREFIX}/rollback")
    }

    fn entry_key(id: &str) -> String {
        format!("{}/{id}.json", Self::entry_prefix())
    }

    /// Save the current state of every row touched by `changes`.
    ///
    /// Returns the entry id, or `None` when there was nothing to save. An
    /// error means nothing was written to the row documents yet and the apply
    /// must not proceed.
    pub async fn create_rollback_entry(
        &self,
        changes: &ChangeSet,
    ) -> MetadataResult<Option<String>> {
        let mut entry = RollbackEntry::default();
        for table_changes in changes.tables() {
            let table = table_changes.table;
            for key in table_changes.rows.keys() {
                match self.client.get_row(table, key).await? {
                    Some(current) => {
                        entry
                            .updated_or_deleted_rows
                            .entry(table.name.to_string())
                            .or_default()
                            .insert(key.clone(), current);
                    }
                    None => {
                        entry
                            .created_keys
                            .entry(table.name.to_string())
                            .or_default()
                            .insert(key.clone());
                    }
                }
            }
        }

        if entry.is_empty() {
            return Ok(None);
        }

        let id = Uuid::new_v4().to_string();
        let data = Bytes::from(serde_json::to_vec(&entry)?);
        self.client
            .store()
            .put(&Self::entry_key(&id), data)
            .await?;
        tracing::debug!(entry = %id, rows = entry.len(), "rollback entry written");
        Ok(Some(id))
    }

    /// Delete the entry after a successful apply.
    pub async fn cleanup(&self, id: &str) -> MetadataResult<()> {
        self.client.store().delete(&Self::entry_key(id)).await?;
        tracing::debug!(entry = %id, "rollback entry removed");
        Ok(())
    }

    /// Stored entries, keyed by object key.
    async fn load_entries(&self) -> MetadataResult<Vec<(String, RollbackEntry)>> {
        let keys = self.client.store().list(&Self::entry_prefix()).await?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            match self.client.store().get(&key).await {
                Ok(data) => entries.push((key, serde_json::from_slice(&data)?)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(entries)
    }

    /// Undo an interrupted apply, if one left its entry behind.
    ///
    /// Returns `true` if an entry was replayed. Running this again after it
    /// succeeded is a no-op.
    pub async fn rollback_if_needed(&self) -> MetadataResult<bool> {
        let mut entries = self.load_entries().await?;
        let (object_key, entry) = match entries.len() {
            0 => return Ok(false),
            1 => entries.remove(0),
            n => {
                return Err(MetadataError::implementation(format!(
                    "found {n} rollback entries, at most one may exist"
                )));
            }
        };

        tracing::warn!(entry = %object_key, rows = entry.len(), "replaying rollback entry");

        for (table_name, keys) in &entry.created_keys {
            let table = table_by_name(table_name)?;
            for key in keys {
                match self.client.delete_row(table, key).await {
                    Ok(()) | Err(MetadataError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        for (table_name, rows) in &entry.updated_or_deleted_rows {
            let table = table_by_name(table_name)?;
            for (key, row) in rows {
                table.validate(row)?;
                self.client.put_row(table, key, row).await?;
            }
        }

        match self.client.store().delete(&object_key).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(entry = %object_key, "rollback entry replayed");
        Ok(true)
    }

    /// Whether an entry is currently stored.
    pub async fn has_pending_entry(&self) -> MetadataResult<bool> {
        Ok(!self
            .client
            .store()
            .list(&Self::entry_prefix())
            .await?
            .is_empty())
    }
}
