use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named text buffer held by the workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl File {
    /// Create a file with a freshly generated id.
    pub fn new(
        name: impl Into<String>,
        content: impl Into<String>,
        language: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            content: content.into(),
            language,
            last_modified: Utc::now(),
        }
    }
}

/// In-progress rename, staged before it is committed to a `File::name`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameState {
    pub is_renaming: bool,
    pub new_file_name: String,
    pub file_to_rename: Option<String>,
}

/// Normalized outcome of a run. `Default` is the empty shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    pub status_message: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_empty(&self) -> bool {
        *self == ExecutionResult::default()
    }
}

/// Where the workspace is in the run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// Whole workspace state, owned by a `WorkspaceStore`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    /// Transient edit buffer; only a save commits it to a file.
    pub code: String,
    pub language: String,
    pub files: Vec<File>,
    /// Weak reference into `files` by id.
    pub current_file: Option<String>,
    pub rename: RenameState,
    pub loading: bool,
    pub result: ExecutionResult,
}

impl WorkspaceState {
    pub fn new(language: impl Into<String>, files: Vec<File>) -> Self {
        Self {
            language: language.into(),
            files,
            ..Default::default()
        }
    }

    pub fn find_file(&self, id: &str) -> Option<&File> {
        self.files.iter().find(|file| file.id == id)
    }

    pub fn current_file(&self) -> Option<&File> {
        self.current_file
            .as_deref()
            .and_then(|id| self.find_file(id))
    }

    /// True when the buffer holds edits the current file does not have yet.
    pub fn is_dirty(&self) -> bool {
        match self.current_file() {
            Some(file) => file.content != self.code,
            None => !self.code.is_empty(),
        }
    }

    pub fn run_status(&self) -> RunStatus {
        if self.loading {
            RunStatus::Loading
        } else if self.result.is_empty() {
            RunStatus::Idle
        } else if self.result.success {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }
}
