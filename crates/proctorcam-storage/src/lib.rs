//! Object storage seam for snapshot uploads.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use proctorcam_types::{
    config::{StorageBackend, StorageConfig},
    snapshot::SnapshotKey,
    ProctorError, Result,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

mod http;

pub use http::HttpObjectStore;

/// Confirmation that an object was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: usize,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`. Resolves only once the store has confirmed the write.
    async fn put_object(
        &self,
        key: &SnapshotKey,
        content_type: &str,
        body: Vec<u8>,
        token: &str,
    ) -> Result<StoredObject>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn put_object(
        &self,
        key: &SnapshotKey,
        content_type: &str,
        body: Vec<u8>,
        token: &str,
    ) -> Result<StoredObject> {
        (**self).put_object(key, content_type, body, token).await
    }
}

/// Writes snapshots below a root directory, mirroring the key layout.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.root.join(key.as_path())
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn put_object(
        &self,
        key: &SnapshotKey,
        content_type: &str,
        body: Vec<u8>,
        _token: &str,
    ) -> Result<StoredObject> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| upload_error(format!("create dir {:?}: {err}", parent)))?;
        }
        let size = body.len();
        tokio::fs::write(&path, body)
            .await
            .map_err(|err| upload_error(format!("write {:?}: {err}", path)))?;
        debug!("Stored {} ({}, {} bytes) at {:?}", key, content_type, size, path);
        Ok(StoredObject {
            key: key.as_path(),
            size,
        })
    }
}

/// In-process store used by tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
    fail_uploads: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated upload failures.
    pub fn set_failing(&self, failing: bool) {
        self.fail_uploads.store(failing, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }

    pub async fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        key: &SnapshotKey,
        content_type: &str,
        body: Vec<u8>,
        _token: &str,
    ) -> Result<StoredObject> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(upload_error(format!("simulated failure for {}", key)));
        }
        let size = body.len();
        self.objects
            .lock()
            .await
            .insert(key.as_path(), (content_type.to_string(), body));
        Ok(StoredObject {
            key: key.as_path(),
            size,
        })
    }
}

/// Build the configured store.
pub fn store_from_config(config: &StorageConfig, timeout_ms: u64) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::Http => {
            info!(
                "Uploading snapshots to {} (bucket {}, region {})",
                config.endpoint, config.bucket, config.region
            );
            Ok(Arc::new(HttpObjectStore::new(
                &config.endpoint,
                &config.bucket,
                timeout_ms,
            )?))
        }
        StorageBackend::LocalDir => {
            info!("Writing snapshots below {}", config.endpoint);
            Ok(Arc::new(LocalDirStore::new(&config.endpoint)))
        }
    }
}

pub fn upload_error(message: impl Into<String>) -> ProctorError {
    ProctorError::UploadFailed(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_records_and_fails_on_demand() {
        let store = MemoryStore::new();
        let key = SnapshotKey::new("snaps", "s1", 10);
        let stored = store
            .put_object(&key, "image/jpeg", vec![1, 2, 3], "tok")
            .await
            .expect("put");
        assert_eq!(stored.size, 3);
        assert_eq!(store.keys().await, vec!["snaps/s1/image_10.jpeg".to_string()]);

        store.set_failing(true);
        let err = store
            .put_object(&SnapshotKey::new("snaps", "s1", 11), "image/jpeg", vec![], "tok")
            .await
            .expect_err("failing");
        assert!(matches!(err, ProctorError::UploadFailed(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn local_dir_store_mirrors_key_layout() {
        let root = std::env::temp_dir().join("proctorcam-local-store-test");
        let store = LocalDirStore::new(&root);
        let key = SnapshotKey::new("mobile_snapshots", "sess", 42);
        store
            .put_object(&key, "image/jpeg", vec![0xFF, 0xD8], "tok")
            .await
            .expect("put");
        let written = std::fs::read(root.join("mobile_snapshots/sess/image_42.jpeg")).expect("read");
        assert_eq!(written, vec![0xFF, 0xD8]);
        std::fs::remove_dir_all(&root).expect("cleanup");
    }
}
