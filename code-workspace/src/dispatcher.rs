use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    engine::{EngineResponse, ExecuteRequest, ExecutionEngine},
    error::{Result, WorkspaceError},
    state::ExecutionResult,
    store::{RunTicket, WorkspaceStore},
};

/// Status message for an engine-reported failure that carries no error text
pub const ENGINE_FAILURE_MESSAGE: &str = "An error occurred.";
/// Status message for a failed request that carries no error text
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Error executing code.";

/// Sends the buffer to the execution engine and publishes the outcome into the store.
#[derive(Clone)]
pub struct ExecutionDispatcher {
    store: Arc<WorkspaceStore>,
    engine: Arc<dyn ExecutionEngine>,
}

impl ExecutionDispatcher {
    pub fn new(store: Arc<WorkspaceStore>, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<WorkspaceStore> {
        &self.store
    }

    /// Run `code` as `language`.
    ///
    /// An empty language is a silent no-op: no request, no Loading toggle and
    /// no result. Otherwise Loading is raised for the duration of exactly one
    /// engine request and cleared on every exit path, including a panic or the
    /// future being dropped.
    pub async fn execute_code(&self, code: &str, language: &str) {
        if language.is_empty() {
            warn!("Run requested without a language; ignoring");
            return;
        }

        let ticket = self.store.begin_run();
        self.pending(ticket, code.to_string(), language.to_string())
            .execute()
            .await;
    }

    /// Claim the run slot for the current buffer without awaiting the engine.
    ///
    /// Refused with [`WorkspaceError::RunInProgress`] while Loading, and with
    /// [`WorkspaceError::EmptyBuffer`] or [`WorkspaceError::NoLanguage`] when
    /// there is nothing to submit. Admission and the Loading transition happen
    /// under one store lock.
    pub fn start_run(&self) -> Result<PendingRun> {
        let (ticket, (code, language)) = self.store.begin_run_if(|state| {
            if state.loading {
                return Err(WorkspaceError::RunInProgress);
            }
            if state.code.trim().is_empty() {
                return Err(WorkspaceError::EmptyBuffer);
            }
            if state.language.is_empty() {
                return Err(WorkspaceError::NoLanguage);
            }
            Ok((state.code.clone(), state.language.clone()))
        })?;

        Ok(self.pending(ticket, code, language))
    }

    fn pending(&self, ticket: RunTicket, code: String, language: String) -> PendingRun {
        PendingRun {
            guard: RunGuard::new(self.store.clone(), ticket),
            engine: self.engine.clone(),
            code,
            language,
        }
    }
}

/// A run that already holds Loading and waits to be sent.
///
/// Dropping it without calling [`PendingRun::execute`] clears Loading.
pub struct PendingRun {
    guard: RunGuard,
    engine: Arc<dyn ExecutionEngine>,
    code: String,
    language: String,
}

impl PendingRun {
    pub fn ticket(&self) -> RunTicket {
        self.guard.ticket
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Send the captured buffer to the engine and publish the outcome.
    pub async fn execute(self) {
        let PendingRun {
            guard,
            engine,
            code,
            language,
        } = self;
        info!(
            run = guard.ticket.sequence(),
            language = %language,
            bytes = code.len(),
            "Dispatching code to execution engine"
        );

        let request = ExecuteRequest::encode(&code, &language);
        let outcome = engine.execute(&request).await;
        guard.finish(normalize(outcome));
    }
}

/// Map an engine outcome onto the result shape the store publishes.
pub fn normalize(outcome: Result<EngineResponse>) -> ExecutionResult {
    match outcome {
        Ok(response) if response.success => ExecutionResult {
            output: response.output,
            status_message: response.status_message.unwrap_or_default(),
            success: true,
            execution_time: response.execution_time,
            error: None,
        },
        Ok(response) => {
            info!("Execution engine reported a failed run");
            ExecutionResult {
                output: response.output,
                status_message: response
                    .error
                    .unwrap_or_else(|| ENGINE_FAILURE_MESSAGE.to_string()),
                success: false,
                execution_time: response.execution_time,
                error: None,
            }
        }
        Err(e) => {
            error!("Execution request failed: {}", e);
            transport_failure(&e)
        }
    }
}

fn transport_failure(err: &WorkspaceError) -> ExecutionResult {
    let partial = err.partial_payload();
    let field = |name: &str| {
        partial
            .and_then(|payload| payload.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let payload_error = field("error");

    ExecutionResult {
        output: field("output").unwrap_or_default(),
        status_message: payload_error
            .clone()
            .unwrap_or_else(|| TRANSPORT_FAILURE_MESSAGE.to_string()),
        success: false,
        execution_time: None,
        error: Some(payload_error.unwrap_or_else(|| err.to_string())),
    }
}

// Clears Loading for its ticket when dropped without a result.
struct RunGuard {
    store: Arc<WorkspaceStore>,
    ticket: RunTicket,
    finished: bool,
}

impl RunGuard {
    fn new(store: Arc<WorkspaceStore>, ticket: RunTicket) -> Self {
        Self {
            store,
            ticket,
            finished: false,
        }
    }

    fn finish(mut self, result: ExecutionResult) {
        self.finished = true;
        if !self.store.complete_run(self.ticket, Some(result)) {
            info!(run = self.ticket.sequence(), "Run superseded; outcome dropped");
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!(run = self.ticket.sequence(), "Run ended without an outcome");
            self.store.complete_run(self.ticket, None);
        }
    }
}
