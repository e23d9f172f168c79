use ferrostor_storage::{FilesystemBackend, MemoryBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A store under test plus whatever keeps its backing directory alive.
#[allow(dead_code)]
pub struct TestStore {
    pub store: Arc<dyn ObjectStore>,
    _temp: Option<TempDir>,
}

/// One instance of every backend, so behaviour can be asserted uniformly.
#[allow(dead_code)]
pub async fn all_backends() -> Vec<TestStore> {
    let temp = TempDir::new().unwrap();
    let fs = FilesystemBackend::new(temp.path().join("objects"))
        .await
        .unwrap();
    vec![
        TestStore {
            store: Arc::new(fs),
            _temp: Some(temp),
        },
        TestStore {
            store: Arc::new(MemoryBackend::new()),
            _temp: None,
        },
    ]
}
