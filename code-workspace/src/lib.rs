pub mod action;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod reducer;
pub mod state;
pub mod storage;
pub mod store;
pub mod workspace;

// Re-export commonly used types
pub use action::Action;
pub use dispatcher::{
    ENGINE_FAILURE_MESSAGE, ExecutionDispatcher, PendingRun, TRANSPORT_FAILURE_MESSAGE, normalize,
};
#[cfg(feature = "http")]
pub use engine::HttpExecutionEngine;
pub use engine::{EngineConfig, EngineResponse, ExecuteRequest, ExecutionEngine};
pub use error::{Result, WorkspaceError};
pub use persistence::{FILES_STORAGE_KEY, PersistenceAdapter, save_current_file};
pub use reducer::{reduce, replay};
pub use state::{ExecutionResult, File, RenameState, RunStatus, WorkspaceState};
pub use storage::{FileKeyValueStorage, InMemoryKeyValueStorage, KeyValueStorage};
pub use store::{RunOrdering, RunTicket, WorkspaceStore};
pub use workspace::Workspace;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    struct GatedEngine {
        gate: Mutex<Option<oneshot::Receiver<EngineResponse>>>,
    }

    #[async_trait]
    impl ExecutionEngine for GatedEngine {
        async fn execute(&self, _request: &ExecuteRequest) -> Result<EngineResponse> {
            let gate = self.gate.lock().unwrap().take();
            match gate {
                Some(rx) => rx
                    .await
                    .map_err(|_| WorkspaceError::Transport("gate closed".to_string())),
                None => Err(WorkspaceError::Transport("engine already used".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_run_publishes_loading_then_result() {
        let store = Arc::new(WorkspaceStore::new(WorkspaceState::new("python", Vec::new())));
        let (release, gate) = oneshot::channel();
        let engine = Arc::new(GatedEngine {
            gate: Mutex::new(Some(gate)),
        });
        let dispatcher = ExecutionDispatcher::new(store.clone(), engine);
        let mut rx = store.subscribe();

        let run = tokio::spawn(async move {
            dispatcher.execute_code("print(1)", "python").await;
        });

        let loading = rx.wait_for(|state| state.loading).await.unwrap().clone();
        assert_eq!(loading.run_status(), RunStatus::Loading);
        assert!(loading.result.is_empty());

        release
            .send(EngineResponse {
                success: true,
                output: "1".to_string(),
                status_message: Some("OK".to_string()),
                error: None,
                execution_time: Some(0.01),
            })
            .unwrap();

        let done = rx.wait_for(|state| !state.loading).await.unwrap().clone();
        run.await.unwrap();
        assert_eq!(done.run_status(), RunStatus::Succeeded);
        assert_eq!(done.result.output, "1");
    }

    #[test]
    fn test_storage() {
        let storage = Arc::new(InMemoryKeyValueStorage::new());
        let adapter = PersistenceAdapter::new(storage.clone());

        let files = vec![
            File::new("main.py", "print(1)", Some("python".to_string())),
            File::new("lib.rs", "", Some("rust".to_string())),
        ];
        adapter.write(&files).unwrap();

        let retrieved = storage.get(FILES_STORAGE_KEY).unwrap();
        assert!(retrieved.is_some());
        assert_eq!(adapter.load().unwrap(), files);
    }
}
