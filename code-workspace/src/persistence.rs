use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    action::Action,
    error::Result,
    state::File,
    storage::KeyValueStorage,
    store::WorkspaceStore,
};

/// Key holding the serialized file collection
pub const FILES_STORAGE_KEY: &str = "codeFiles";

/// Commit `code` into the file `current_file_id`, stamping it with the current time.
///
/// With no id the input comes back untouched. Every other file, and the
/// order of the collection, is preserved.
pub fn save_current_file(current_file_id: Option<&str>, code: &str, files: &[File]) -> Vec<File> {
    merge_current_file(current_file_id, code, files, Utc::now())
}

/// [`save_current_file`] with an explicit timestamp.
pub fn merge_current_file(
    current_file_id: Option<&str>,
    code: &str,
    files: &[File],
    now: DateTime<Utc>,
) -> Vec<File> {
    let Some(id) = current_file_id.filter(|id| !id.is_empty()) else {
        return files.to_vec();
    };

    files
        .iter()
        .map(|file| {
            if file.id == id {
                File {
                    content: code.to_string(),
                    last_modified: now,
                    ..file.clone()
                }
            } else {
                file.clone()
            }
        })
        .collect()
}

/// Writes the file collection to durable storage, always as a whole.
#[derive(Clone)]
pub struct PersistenceAdapter {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl PersistenceAdapter {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_key(storage, FILES_STORAGE_KEY)
    }

    pub fn with_key(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Commit the buffer into the current file, then write the collection.
    ///
    /// Returns `None` without writing anything when no file is selected. The
    /// merge, the write and the `SetFiles` publish happen under one store lock.
    pub fn save(&self, store: &WorkspaceStore) -> Result<Option<Vec<File>>> {
        let saved = store.update(|state| {
            let Some(current) = state.current_file.as_deref() else {
                return Ok((Vec::new(), None));
            };

            let merged = save_current_file(Some(current), &state.code, &state.files);
            self.write(&merged)?;
            Ok((
                vec![Action::SetFiles(merged.clone())],
                Some((current.to_string(), merged)),
            ))
        })?;

        match saved {
            Some((current, merged)) => {
                info!(file = %current, files = merged.len(), "Saved current file");
                Ok(Some(merged))
            }
            None => {
                debug!("Save requested with no current file; nothing to do");
                Ok(None)
            }
        }
    }

    /// Replace the persisted snapshot with `files`.
    pub fn write(&self, files: &[File]) -> Result<()> {
        let serialized = serde_json::to_string(files)?;
        self.storage.set(&self.key, &serialized)
    }

    /// Read the persisted snapshot; an absent key is an empty workspace.
    pub fn load(&self) -> Result<Vec<File>> {
        match self.storage.get(&self.key)? {
            Some(serialized) => Ok(serde_json::from_str(&serialized)?),
            None => Ok(Vec::new()),
        }
    }

    /// Load the persisted snapshot into `store`.
    pub fn hydrate(&self, store: &WorkspaceStore) -> Result<usize> {
        let files = self.load()?;
        let count = files.len();
        store.dispatch(Action::SetFiles(files));
        info!(files = count, "Restored files from storage");
        Ok(count)
    }
}
