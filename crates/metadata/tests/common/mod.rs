//! Shared fixtures for metadata integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use ferrostor_core::{NodeName, ResourceName};
use ferrostor_metadata::models::{NodeRow, ResourceDefinitionRow};
use ferrostor_metadata::schema::{ALL_TABLES, Table};
use ferrostor_metadata::{
    BackendKind, ChangeSet, DbBackend, MetadataError, MetadataResult, Row, TransactionObject,
    TxId,
};
use ferrostor_storage::{MemoryBackend, ObjectStore, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn node(name: &str) -> NodeRow {
    NodeRow {
        node_name: NodeName::new(name).unwrap(),
        node_type: "SATELLITE".to_string(),
        flags: 0,
    }
}

pub fn rsc_dfn(name: &str, flags: u64) -> ResourceDefinitionRow {
    ResourceDefinitionRow {
        rsc_name: ResourceName::new(name).unwrap(),
        flags,
    }
}

/// Every row of every table, keyed by table name.
pub async fn dump(backend: &dyn DbBackend) -> BTreeMap<&'static str, Vec<Row>> {
    let mut out = BTreeMap::new();
    for table in ALL_TABLES {
        let mut rows = backend.load_table(table).await.unwrap();
        rows.sort_by_key(|row| row.key(table).unwrap());
        out.insert(table.name, rows);
    }
    out
}

/// Backend whose `apply` always fails.
#[derive(Default)]
pub struct FailingBackend {
    pub applies: AtomicUsize,
}

#[async_trait]
impl DbBackend for FailingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sql
    }

    async fn migrate(&self) -> MetadataResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }

    async fn load_table(&self, _table: &'static Table) -> MetadataResult<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn apply(&self, _changes: &ChangeSet) -> MetadataResult<()> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        Err(MetadataError::Database(sqlx::Error::PoolClosed))
    }
}

/// Object store wrapper that fails writes and deletes of keys containing a marker.
pub struct FaultyStore {
    inner: MemoryBackend,
    fail_marker: Mutex<Option<String>>,
    failures_left: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(),
            fail_marker: Mutex::new(None),
            failures_left: AtomicUsize::new(0),
        })
    }

    /// Fail every subsequent put/delete of a key containing `marker`.
    pub fn fail_on(&self, marker: &str) {
        self.fail_times(marker, usize::MAX);
    }

    /// Fail the next put/delete of a key containing `marker`, then recover.
    pub fn fail_once_on(&self, marker: &str) {
        self.fail_times(marker, 1);
    }

    fn fail_times(&self, marker: &str, times: usize) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.failures_left.store(0, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> StorageResult<()> {
        let marker = self.fail_marker.lock().unwrap();
        let matches = marker.as_deref().is_some_and(|m| key.contains(m));
        if !matches || self.failures_left.load(Ordering::SeqCst) == 0 {
            return Ok(());
        }
        let _ = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(if n == usize::MAX { n } else { n.saturating_sub(1) })
            });
        Err(StorageError::Io(std::io::Error::other(format!(
            "injected failure for {key}"
        ))))
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.check(key)?;
        self.inner.put(key, data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.check(key)?;
        self.inner.put_if_not_exists(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check(key)?;
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

/// Transactional object that counts its callbacks.
#[derive(Default)]
pub struct RecordingObject {
    pub owner: Mutex<Option<TxId>>,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl RecordingObject {
    pub fn dirty_for(tx: TxId) -> Arc<Self> {
        let object = Self::default();
        *object.owner.lock().unwrap() = Some(tx);
        Arc::new(object)
    }
}

impl TransactionObject for RecordingObject {
    fn is_dirty(&self) -> bool {
        self.owner.lock().unwrap().is_some()
    }

    fn dirty_owner(&self) -> Option<TxId> {
        *self.owner.lock().unwrap()
    }

    fn commit(&self) {
        self.commits.fetch_add(1, Ordering::SeqCst);
        *self.owner.lock().unwrap() = None;
    }

    fn rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        *self.owner.lock().unwrap() = None;
    }
}
