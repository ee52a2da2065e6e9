//! Blob persistence backends for the catalog
//!
//! A backend stores opaque byte blobs under string keys. Writes must be
//! durable (or at least fully visible) before `write` returns.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Named-blob persistence used by the catalog store
pub trait BlobStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Read a blob, `None` when nothing was ever written under `key`
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the blob stored under `key`
    fn write(&self, key: &str, data: &[u8]) -> Result<()>;
}

/// Embedded sled database backend
pub struct SledBlobStore {
    db: sled::Db,
}

impl SledBlobStore {
    /// Open (or create) the sled database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Failed to open sled database at: {}", path.display()))?;

        info!("Catalog database opened at: {}", path.display());
        Ok(Self { db })
    }
}

impl BlobStore for SledBlobStore {
    fn name(&self) -> &str {
        "sled"
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key.as_bytes())
            .with_context(|| format!("Failed to read '{}' from sled", key))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        self.db
            .insert(key.as_bytes(), data)
            .with_context(|| format!("Failed to write '{}' to sled", key))?;

        // Flush synchronously so the write survives a crash right after return
        self.db.flush().context("Failed to flush sled database")?;

        debug!("Wrote {} bytes to sled key '{}'", data.len(), key);
        Ok(())
    }
}

/// One JSON file per key inside a directory
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never sees a half-written file.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            debug!("Creating catalog directory: {}", dir.display());
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create catalog directory: {}", dir.display()))?;
        }
        Ok(Self { dir })
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl BlobStore for FileBlobStore {
    fn name(&self) -> &str {
        "file"
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, data).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move {} into place", path.display()))?;

        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}

/// Process-local backend, nothing survives a restart
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a blob (e.g. to simulate data left by an older version)
    pub fn with_blob(self, key: &str, data: impl Into<Vec<u8>>) -> Self {
        self.blobs.write().insert(key.to_string(), data.into());
        self
    }
}

impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        self.blobs.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn BlobStore) {
        assert_eq!(store.read("songs").unwrap(), None);

        store.write("songs", b"[1]").unwrap();
        assert_eq!(store.read("songs").unwrap().as_deref(), Some(&b"[1]"[..]));

        store.write("songs", b"[1,2]").unwrap();
        assert_eq!(store.read("songs").unwrap().as_deref(), Some(&b"[1,2]"[..]));

        // Keys are independent
        assert_eq!(store.read("other").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryBlobStore::new());
    }

    #[test]
    fn test_sled_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledBlobStore::open(temp_dir.path().join("sled")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sled");
        {
            let store = SledBlobStore::open(&path).unwrap();
            store.write("songs", b"[]").unwrap();
        }
        let store = SledBlobStore::open(&path).unwrap();
        assert_eq!(store.read("songs").unwrap().as_deref(), Some(&b"[]"[..]));
    }

    #[test]
    fn test_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::new(temp_dir.path().join("catalog")).unwrap();
        exercise(&store);

        // No temp file left behind
        assert!(store.path_for("songs").exists());
        assert!(!store.path_for("songs").with_extension("json.tmp").exists());
    }
}
