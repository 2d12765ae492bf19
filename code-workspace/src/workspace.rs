//! `Workspace` – convenience wrapper that ties a [`WorkspaceStore`] to the execution engine and
//! to durable storage.
//!
//! The store, dispatcher and persistence adapter are usable on their own; `Workspace` adds the
//! file lifecycle around them (create, open, delete, rename) so an application only has to hold
//! one object:
//!
//! ```rust,ignore
//! let workspace = Workspace::new(store, engine, storage);
//! workspace.restore()?;
//!
//! let file = workspace.create_file("main.py", Some("python".to_string()))?;
//! workspace.dispatch(Action::SetCode("print(1)".to_string()));
//! workspace.save()?;
//! workspace.run().await;
//! ```
//!
//! Every operation that changes the file collection also rewrites the persisted snapshot, so
//! storage always holds the whole collection as last committed. Buffer edits (`SetCode`) are
//! never persisted until [`Workspace::save`].

use std::sync::Arc;
use tracing::info;

use crate::{
    action::Action,
    dispatcher::{ExecutionDispatcher, PendingRun},
    engine::ExecutionEngine,
    error::{Result, WorkspaceError},
    persistence::PersistenceAdapter,
    state::{File, WorkspaceState},
    storage::KeyValueStorage,
    store::WorkspaceStore,
};

#[derive(Clone)]
pub struct Workspace {
    store: Arc<WorkspaceStore>,
    dispatcher: ExecutionDispatcher,
    persistence: PersistenceAdapter,
}

impl Workspace {
    pub fn new(
        store: Arc<WorkspaceStore>,
        engine: Arc<dyn ExecutionEngine>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        Self {
            dispatcher: ExecutionDispatcher::new(store.clone(), engine),
            persistence: PersistenceAdapter::new(storage),
            store,
        }
    }

    pub fn store(&self) -> &Arc<WorkspaceStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &ExecutionDispatcher {
        &self.dispatcher
    }

    pub fn persistence(&self) -> &PersistenceAdapter {
        &self.persistence
    }

    pub fn snapshot(&self) -> WorkspaceState {
        self.store.snapshot()
    }

    pub fn dispatch(&self, action: Action) -> WorkspaceState {
        self.store.dispatch(action)
    }

    /// Load the persisted file collection into the store.
    pub fn restore(&self) -> Result<usize> {
        self.persistence.hydrate(&self.store)
    }

    /// Run the buffer with the selected language.
    pub async fn run(&self) {
        let (code, language) = self
            .store
            .read(|state| (state.code.clone(), state.language.clone()));
        self.dispatcher.execute_code(&code, &language).await;
    }

    /// Commit the buffer into the current file and persist the collection.
    pub fn save(&self) -> Result<Option<Vec<File>>> {
        self.persistence.save(&self.store)
    }

    /// Claim the run slot for the current buffer; see [`ExecutionDispatcher::start_run`].
    pub fn start_run(&self) -> Result<PendingRun> {
        self.dispatcher.start_run()
    }

    /// Append an empty file, select it and clear the buffer.
    pub fn create_file(&self, name: impl Into<String>, language: Option<String>) -> Result<File> {
        let file = File::new(name, "", language.clone());
        self.store.update(|state| {
            let mut files = state.files.clone();
            files.push(file.clone());
            self.persistence.write(&files)?;

            let mut actions = vec![
                Action::SetFiles(files),
                Action::SetCurrentFile(Some(file.id.clone())),
                Action::SetCode(String::new()),
            ];
            if let Some(language) = language {
                actions.push(Action::SetLanguage(language));
            }
            Ok((actions, ()))
        })?;

        info!(file = %file.id, name = %file.name, "Created file");
        Ok(file)
    }

    /// Select a file and load its content into the buffer.
    pub fn open_file(&self, id: &str) -> Result<File> {
        let file = self.find(id)?;

        let mut actions = vec![
            Action::SetCurrentFile(Some(file.id.clone())),
            Action::SetCode(file.content.clone()),
        ];
        if let Some(language) = &file.language {
            actions.push(Action::SetLanguage(language.clone()));
        }
        self.store.dispatch_all(actions);

        Ok(file)
    }

    /// Remove a file, dropping any selection or rename that pointed at it.
    pub fn delete_file(&self, id: &str) -> Result<File> {
        let removed = self.store.update(|state| {
            let removed = state
                .find_file(id)
                .cloned()
                .ok_or_else(|| WorkspaceError::FileNotFound(id.to_string()))?;
            let remaining: Vec<File> = state
                .files
                .iter()
                .filter(|file| file.id != id)
                .cloned()
                .collect();
            self.persistence.write(&remaining)?;

            let mut actions = vec![Action::SetFiles(remaining)];
            if state.current_file.as_deref() == Some(id) {
                actions.push(Action::SetCode(String::new()));
            }
            if state.rename.file_to_rename.as_deref() == Some(id) {
                actions.extend(reset_rename());
            }
            Ok((actions, removed))
        })?;

        info!(file = %id, "Deleted file");
        Ok(removed)
    }

    /// Stage a rename of `id`, seeded with its current name.
    pub fn start_rename(&self, id: &str) -> Result<()> {
        let file = self.find(id)?;
        self.store.dispatch_all([
            Action::SetFileToRename(Some(file.id)),
            Action::SetNewFileName(file.name),
            Action::SetRenaming(true),
        ]);
        Ok(())
    }

    pub fn set_new_file_name(&self, name: impl Into<String>) {
        self.store.dispatch(Action::SetNewFileName(name.into()));
    }

    pub fn cancel_rename(&self) {
        self.store.dispatch_all(reset_rename());
    }

    /// Write the staged name into its file.
    ///
    /// Blank names abandon the rename. Returns the renamed file, or `None`
    /// when nothing was committed.
    pub fn commit_rename(&self) -> Result<Option<File>> {
        let renamed = self.store.update(|state| {
            let name = state.rename.new_file_name.trim();
            let target = match state.rename.file_to_rename.as_deref() {
                Some(id) if state.rename.is_renaming && !name.is_empty() => id,
                _ => return Ok((reset_rename().to_vec(), None)),
            };

            let files: Vec<File> = state
                .files
                .iter()
                .map(|file| {
                    if file.id == target {
                        File {
                            name: name.to_string(),
                            ..file.clone()
                        }
                    } else {
                        file.clone()
                    }
                })
                .collect();
            let renamed = files.iter().find(|file| file.id == target).cloned();
            self.persistence.write(&files)?;

            let mut actions = vec![Action::SetFiles(files)];
            actions.extend(reset_rename());
            Ok((actions, renamed))
        })?;

        if let Some(file) = &renamed {
            info!(file = %file.id, name = %file.name, "Renamed file");
        }
        Ok(renamed)
    }

    fn find(&self, id: &str) -> Result<File> {
        self.store
            .read(|state| state.find_file(id).cloned())
            .ok_or_else(|| WorkspaceError::FileNotFound(id.to_string()))
    }
}

fn reset_rename() -> [Action; 3] {
    [
        Action::SetRenaming(false),
        Action::SetNewFileName(String::new()),
        Action::SetFileToRename(None),
    ]
}
