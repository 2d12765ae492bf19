use serde::{Deserialize, Serialize};

use crate::state::{ExecutionResult, File};

/// Every mutation a `WorkspaceStore` accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Action {
    /// Replace the edit buffer
    SetCode(String),
    /// Select the language submitted with the next run
    SetLanguage(String),
    /// Replace the whole file collection
    SetFiles(Vec<File>),
    /// Select a file by id, or clear the selection
    SetCurrentFile(Option<String>),
    /// Toggle rename staging
    SetRenaming(bool),
    /// Stage the name a rename will commit
    SetNewFileName(String),
    /// Stage which file a rename targets
    SetFileToRename(Option<String>),
    /// Raise or clear the busy flag
    SetLoading(bool),
    /// Publish a run outcome
    SetResult(ExecutionResult),
}

impl Action {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SetCode(_) => "set_code",
            Action::SetLanguage(_) => "set_language",
            Action::SetFiles(_) => "set_files",
            Action::SetCurrentFile(_) => "set_current_file",
            Action::SetRenaming(_) => "set_renaming",
            Action::SetNewFileName(_) => "set_new_file_name",
            Action::SetFileToRename(_) => "set_file_to_rename",
            Action::SetLoading(_) => "set_loading",
            Action::SetResult(_) => "set_result",
        }
    }

    /// Whether only the execution dispatcher may apply this action.
    ///
    /// Loading and the result track an outstanding run; a caller setting them
    /// directly could leave Loading raised with no run to clear it.
    pub fn is_run_outcome(&self) -> bool {
        matches!(self, Action::SetLoading(_) | Action::SetResult(_))
    }
}
