//! Rollback entries of the document backend.

mod common;

use bytes::Bytes;
use common::{FaultyStore, dump, node, rsc_dfn};
use ferrostor_metadata::changes::{ChangeSet, RowChange};
use ferrostor_metadata::crd::{CrdClient, CrdRollbackMgr};
use ferrostor_metadata::models::{NodeRow, ResourceDefinitionRow, TableRow};
use ferrostor_metadata::{CrdBackend, DbBackend, MetadataError, TransactionMgrFactory};
use ferrostor_storage::{MemoryBackend, ObjectStore};
use std::sync::Arc;

async fn seeded() -> (Arc<MemoryBackend>, CrdBackend) {
    let store = Arc::new(MemoryBackend::new());
    let backend = CrdBackend::new(store.clone());
    let mut changes = ChangeSet::new();
    changes
        .record(NodeRow::table(), RowChange::Create(node("n1").to_row()))
        .unwrap();
    changes
        .record(NodeRow::table(), RowChange::Create(node("n2").to_row()))
        .unwrap();
    changes
        .record(
            ResourceDefinitionRow::table(),
            RowChange::Create(rsc_dfn("rsc1", 0).to_row()),
        )
        .unwrap();
    backend.apply(&changes).await.unwrap();
    (store, backend)
}

/// Creates n3, updates rsc1, deletes n2.
fn mixed_changes() -> ChangeSet {
    let mut changes = ChangeSet::new();
    changes
        .record(NodeRow::table(), RowChange::Create(node("n3").to_row()))
        .unwrap();
    changes
        .record(
            ResourceDefinitionRow::table(),
            RowChange::Update(rsc_dfn("rsc1", 7).to_row()),
        )
        .unwrap();
    changes
        .record(NodeRow::table(), RowChange::Delete(node("n2").to_row()))
        .unwrap();
    changes
}

#[tokio::test]
async fn test_entry_records_one_action_per_row() {
    let (store, backend) = seeded().await;
    let mgr = CrdRollbackMgr::new(CrdClient::new(store.clone()));

    let id = mgr
        .create_rollback_entry(&mixed_changes())
        .await
        .unwrap()
        .unwrap();
    let data = store.get(&format!("crd/rollback/{id}.json")).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&data).unwrap();

    assert_eq!(json["createdKeys"]["nodes"], serde_json::json!(["n3"]));
    assert_eq!(json["updatedOrDeletedRows"]["nodes"]["n2"]["node_name"], "n2");
    assert_eq!(
        json["updatedOrDeletedRows"]["resource_definitions"]["rsc1"]["flags"],
        0
    );

    mgr.cleanup(&id).await.unwrap();
    assert!(!mgr.has_pending_entry().await.unwrap());
    drop(backend);
}

#[tokio::test]
async fn test_empty_change_set_writes_no_entry() {
    let store = Arc::new(MemoryBackend::new());
    let mgr = CrdRollbackMgr::new(CrdClient::new(store.clone()));
    assert!(
        mgr.create_rollback_entry(&ChangeSet::new())
            .await
            .unwrap()
            .is_none()
    );
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_snapshot_apply_recover_restores_pre_state() {
    let (store, backend) = seeded().await;
    let before = dump(&backend).await;

    // Simulate a crash between the mutation and cleanup.
    let mgr = CrdRollbackMgr::new(CrdClient::new(store.clone()));
    let changes = mixed_changes();
    mgr.create_rollback_entry(&changes).await.unwrap().unwrap();
    let client = CrdClient::new(store.clone());
    for table_changes in changes.tables() {
        for (key, change) in &table_changes.rows {
            match change {
                RowChange::Create(row) | RowChange::Update(row) => {
                    client.put_row(table_changes.table, key, row).await.unwrap()
                }
                RowChange::Delete(_) => client.delete_row(table_changes.table, key).await.unwrap(),
            }
        }
    }
    assert_ne!(dump(&backend).await, before);

    // A fresh backend over the same store, as after a restart.
    let restarted = CrdBackend::new(store.clone());
    assert!(restarted.recover().await.unwrap());
    assert_eq!(dump(&restarted).await, before);

    // Second recovery finds nothing.
    assert!(!restarted.recover().await.unwrap());
    assert_eq!(dump(&restarted).await, before);
}

#[tokio::test]
async fn test_more_than_one_entry_is_implementation_error() {
    let (store, backend) = seeded().await;
    let mgr = CrdRollbackMgr::new(CrdClient::new(store.clone()));
    mgr.create_rollback_entry(&mixed_changes()).await.unwrap();
    mgr.create_rollback_entry(&mixed_changes()).await.unwrap();

    let err = backend.recover().await.unwrap_err();
    assert!(err.is_implementation_error());

    // The guard also blocks further applies.
    let err = backend.apply(&mixed_changes()).await.unwrap_err();
    assert!(err.is_implementation_error());
}

#[tokio::test]
async fn test_unknown_table_in_entry_is_implementation_error() {
    let store = Arc::new(MemoryBackend::new());
    store
        .put(
            "crd/rollback/bogus.json",
            Bytes::from_static(br#"{"createdKeys":{"no_such_table":["k"]},"updatedOrDeletedRows":{}}"#),
        )
        .await
        .unwrap();
    let backend = CrdBackend::new(store);
    let err = backend.recover().await.unwrap_err();
    assert!(matches!(err, MetadataError::Implementation(_)));
}

#[tokio::test]
async fn test_failed_write_rolls_back_immediately() {
    let store = FaultyStore::new();
    let backend = Arc::new(CrdBackend::new(store.clone()));
    let factory = TransactionMgrFactory::new(backend.clone());

    let mut tx = factory.begin();
    tx.create_row(&node("n1")).unwrap();
    tx.create_row(&rsc_dfn("rsc1", 0)).unwrap();
    tx.commit().await.unwrap();
    let before = dump(backend.as_ref()).await;

    // Node writes succeed, the resource definition write fails once.
    store.fail_once_on("resource_definitions");
    let mut tx = factory.begin();
    tx.create_row(&node("n2")).unwrap();
    tx.update_row(&rsc_dfn("rsc1", 3)).unwrap();
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, MetadataError::Storage(_)));
    tx.rollback();

    assert_eq!(dump(backend.as_ref()).await, before);
    assert!(!backend.rollback_mgr().has_pending_entry().await.unwrap());
}

#[tokio::test]
async fn test_failed_cleanup_is_recovered_on_restart() {
    let store = FaultyStore::new();
    let backend = CrdBackend::new(store.clone());
    let mut changes = ChangeSet::new();
    changes
        .record(NodeRow::table(), RowChange::Create(node("n1").to_row()))
        .unwrap();
    backend.apply(&changes).await.unwrap();
    let before = dump(&backend).await;

    // The rollback entry is written with put, and removed with delete; make only
    // the delete fail by arming after the entry exists.
    let mut changes = ChangeSet::new();
    changes
        .record(NodeRow::table(), RowChange::Create(node("n2").to_row()))
        .unwrap();
    let mgr = backend.rollback_mgr();
    let id = mgr.create_rollback_entry(&changes).await.unwrap().unwrap();
    backend
        .client()
        .create_row(NodeRow::table(), "n2", &node("n2").to_row())
        .await
        .unwrap();
    store.fail_on("crd/rollback");
    assert!(mgr.cleanup(&id).await.is_err());
    store.heal();

    let restarted = CrdBackend::new(store.clone());
    assert!(restarted.recover().await.unwrap());
    assert_eq!(dump(&restarted).await, before);
}
