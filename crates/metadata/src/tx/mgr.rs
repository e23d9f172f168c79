use super::{TransactionObject, TxId};
use crate::backend::DbBackend;
use crate::changes::{ChangeSet, RowChange};
use crate::error::{MetadataError, MetadataResult};
use crate::models::TableRow;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// One unit of work over transactional objects and persisted rows.
pub struct TransactionMgr {
    id: TxId,
    backend: Arc<dyn DbBackend>,
    changes: ChangeSet,
    objects: Vec<Arc<dyn TransactionObject>>,
    registered: HashSet<usize>,
}

fn identity(object: &Arc<dyn TransactionObject>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

impl TransactionMgr {
    pub fn new(id: TxId, backend: Arc<dyn DbBackend>) -> Self {
        Self {
            id,
            backend,
            changes: ChangeSet::new(),
            objects: Vec::new(),
            registered: HashSet::new(),
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn backend(&self) -> &Arc<dyn DbBackend> {
        &self.backend
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Add an object to this transaction.
    ///
    /// Registration order is kept and duplicates are ignored. An object that
    /// already carries uncommitted changes of a different transaction cannot be
    /// registered: those changes would be silently committed or discarded here.
    pub fn register(&mut self, object: Arc<dyn TransactionObject>) -> MetadataResult<()> {
        if let Some(owner) = object.dirty_owner()
            && owner != self.id
        {
            return Err(MetadataError::implementation(format!(
                "object has uncommitted changes of {owner} and cannot join {}",
                self.id
            )));
        }
        if self.registered.insert(identity(&object)) {
            self.objects.push(object);
        }
        Ok(())
    }

    pub fn create_row<R: TableRow>(&mut self, row: &R) -> MetadataResult<()> {
        self.changes.record(R::table(), RowChange::Create(row.to_row()))
    }

    pub fn update_row<R: TableRow>(&mut self, row: &R) -> MetadataResult<()> {
        self.changes.record(R::table(), RowChange::Update(row.to_row()))
    }

    pub fn delete_row<R: TableRow>(&mut self, row: &R) -> MetadataResult<()> {
        self.changes.record(R::table(), RowChange::Delete(row.to_row()))
    }

    /// Whether there is anything to commit.
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty() || self.objects.iter().any(|o| o.is_dirty())
    }

    /// Persist the collected changes, then commit every dirty object.
    ///
    /// If the backend rejects the changes, no object is committed and the error
    /// is returned; the caller is expected to [`rollback`](Self::rollback).
    pub async fn commit(&mut self) -> MetadataResult<()> {
        if !self.changes.is_empty() {
            self.backend.apply(&self.changes).await?;
        }
        for object in &self.objects {
            if object.is_dirty() {
                object.commit();
            }
        }
        tracing::debug!(
            tx = %self.id,
            objects = self.objects.len(),
            rows = self.changes.len(),
            "transaction committed"
        );
        self.reset();
        Ok(())
    }

    /// Restore every dirty object and drop the collected changes.
    pub fn rollback(&mut self) {
        for object in &self.objects {
            if object.is_dirty() {
                object.rollback();
            }
        }
        tracing::debug!(tx = %self.id, objects = self.objects.len(), "transaction rolled back");
        self.reset();
    }

    fn reset(&mut self) {
        self.changes.clear();
        self.objects.clear();
        self.registered.clear();
    }
}

impl Drop for TransactionMgr {
    fn drop(&mut self) {
        if self.is_dirty() {
            tracing::warn!(tx = %self.id, "transaction dropped with uncommitted changes, rolling back");
            self.rollback();
        }
    }
}

/// Hands out transactions bound to one backend.
pub struct TransactionMgrFactory {
    backend: Arc<dyn DbBackend>,
    next_id: AtomicU64,
}

impl TransactionMgrFactory {
    pub fn new(backend: Arc<dyn DbBackend>) -> Self {
        Self {
            backend,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn begin(&self) -> TransactionMgr {
        let id = TxId(self.next_id.fetch_add(1, Ordering::Relaxed));
        TransactionMgr::new(id, Arc::clone(&self.backend))
    }

    /// Number of transactions started so far.
    pub fn begun(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }

    pub fn backend(&self) -> &Arc<dyn DbBackend> {
        &self.backend
    }
}
