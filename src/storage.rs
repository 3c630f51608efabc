//! Durable Store
//!
//! Blob persistence for the sync queue and the cache namespaces, so both
//! survive a process restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Key/value blob persistence.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn save_blob(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    async fn delete_blob(&self, key: &str) -> Result<()>;
}

// == Memory Store ==
/// Process-local store. Nothing survives a restart, but it keeps the
/// persistence paths exercised in tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    async fn save_blob(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs.write().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete_blob(&self, key: &str) -> Result<()> {
        self.blobs.write().remove(key);
        Ok(())
    }
}

// == File Store ==
/// One file per blob inside a data directory.
///
/// File names are the hex-encoded blob key, so keys like `cache/user-data`
/// never escape the directory. Writes go through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) the data directory.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| EngineError::Storage(format!("{}: {e}", root.display())))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.blob", hex::encode(key)))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Storage(format!("load {key}: {e}"))),
        }
    }

    async fn save_blob(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| EngineError::Storage(format!("write {key}: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::Storage(format!("rename {key}: {e}")))?;
        debug!(key, bytes = bytes.len(), "Blob saved");
        Ok(())
    }

    async fn delete_blob(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Storage(format!("delete {key}: {e}"))),
        }
    }
}
