mod common;

use bytes::Bytes;
use ferrostor_storage::StorageError;
use futures::future::join_all;

#[tokio::test]
async fn test_missing_objects_report_not_found() {
    for test in common::all_backends().await {
        let store = &test.store;
        let name = store.backend_name();
        assert!(!store.exists("crd/nodes/x").await.unwrap(), "{name}");
        assert!(
            matches!(store.get("crd/nodes/x").await, Err(StorageError::NotFound(_))),
            "{name}"
        );
        assert!(
            matches!(store.delete("crd/nodes/x").await, Err(StorageError::NotFound(_))),
            "{name}"
        );
    }
}

#[tokio::test]
async fn test_list_returns_full_keys_below_prefix() {
    for test in common::all_backends().await {
        let store = &test.store;
        store.put("crd/remotes/a.json", Bytes::from("a")).await.unwrap();
        store.put("crd/remotes/b.json", Bytes::from("b")).await.unwrap();
        store.put("crd/rollback/r.json", Bytes::from("r")).await.unwrap();

        let mut keys = store.list("crd/remotes").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec!["crd/remotes/a.json", "crd/remotes/b.json"],
            "{}",
            store.backend_name()
        );
    }
}

#[tokio::test]
async fn test_concurrent_overwrites_leave_one_complete_value() {
    for test in common::all_backends().await {
        let store = &test.store;
        let writes = (0..16u8).map(|i| {
            let store = store.clone();
            async move {
                store
                    .put("crd/props/shared", Bytes::from(vec![i; 256]))
                    .await
                    .unwrap()
            }
        });
        join_all(writes).await;

        let value = store.get("crd/props/shared").await.unwrap();
        assert_eq!(value.len(), 256);
        assert!(value.iter().all(|b| *b == value[0]), "torn write detected");
        assert_eq!(store.list("crd/props").await.unwrap().len(), 1);
    }
}
