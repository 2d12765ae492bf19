use dashmap::DashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::error::{Result, WorkspaceError};

/// String-keyed, string-valued durable storage.
///
/// Calls are synchronous and a `set` replaces the whole value for its key
/// atomically: readers see either the old value or the new one.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory implementation of KeyValueStorage
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStorage {
    entries: Arc<DashMap<String, String>>,
}

impl InMemoryKeyValueStorage {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl KeyValueStorage for InMemoryKeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileKeyValueStorage {
    dir: PathBuf,
}

impl FileKeyValueStorage {
    /// Open (and create if needed) the storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(WorkspaceError::Storage(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStorage for FileKeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        // write beside the target, then rename over it
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(value.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(&path)
            .map_err(|e| WorkspaceError::Storage(format!("Failed to persist {}: {}", key, e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
