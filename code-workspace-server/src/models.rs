use code_workspace::{File, RunStatus, WorkspaceState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateFileRequest {
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenameFileRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveResponse {
    pub files: Vec<File>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceResponse {
    #[serde(flatten)]
    pub state: WorkspaceState,
    pub run_status: RunStatus,
    pub dirty: bool,
}

impl From<WorkspaceState> for WorkspaceResponse {
    fn from(state: WorkspaceState) -> Self {
        Self {
            run_status: state.run_status(),
            dirty: state.is_dirty(),
            state,
        }
    }
}
