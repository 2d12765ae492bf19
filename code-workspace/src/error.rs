use serde_json::Value;
use thiserror::Error;

/// Errors raised by the workspace core and its collaborators
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Execution engine returned status {status}")]
    EngineStatus { status: u16, body: Option<Value> },

    #[error("Malformed engine response: {message}")]
    MalformedResponse {
        message: String,
        partial: Option<Value>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("A run is already in progress")]
    RunInProgress,

    #[error("Nothing to run: the buffer is empty")]
    EmptyBuffer,

    #[error("No language selected")]
    NoLanguage,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkspaceError {
    /// Whatever JSON body the engine managed to send before the request failed.
    pub fn partial_payload(&self) -> Option<&Value> {
        match self {
            WorkspaceError::EngineStatus { body, .. } => body.as_ref(),
            WorkspaceError::MalformedResponse { partial, .. } => partial.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
