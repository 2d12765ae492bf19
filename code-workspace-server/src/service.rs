use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{delete, get, post},
};
use code_workspace::{
    Action, FileKeyValueStorage, HttpExecutionEngine, InMemoryKeyValueStorage, KeyValueStorage,
    Workspace, WorkspaceError, WorkspaceState, WorkspaceStore,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    config::ServerConfig,
    models::{CreateFileRequest, RenameFileRequest, SaveResponse, WorkspaceResponse},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn conflict_error(message: &str) -> ApiError {
    (StatusCode::CONFLICT, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "file_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn workspace_error(message: &str, e: WorkspaceError) -> ApiError {
    match e {
        WorkspaceError::FileNotFound(id) => not_found_error("File not found", &id),
        refused @ WorkspaceError::RunInProgress => conflict_error(&refused.to_string()),
        refused @ (WorkspaceError::EmptyBuffer | WorkspaceError::NoLanguage) => {
            bad_request_error(&refused.to_string())
        }
        other => {
            error!("{}: {}", message, other);
            internal_error(message, &other.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub workspace: Workspace,
}

/// Wire storage, engine and store together and restore the persisted files.
pub fn build_workspace(config: &ServerConfig) -> anyhow::Result<Workspace> {
    let storage: Arc<dyn KeyValueStorage> = match &config.data_dir {
        Some(dir) => {
            info!("Using file storage at {}", dir.display());
            Arc::new(FileKeyValueStorage::open(dir)?)
        }
        None => {
            info!("Using in-memory storage (set WORKSPACE_DATA_DIR to persist files)");
            Arc::new(InMemoryKeyValueStorage::new())
        }
    };

    let engine = Arc::new(HttpExecutionEngine::new(&config.engine)?);
    let store = Arc::new(
        WorkspaceStore::new(WorkspaceState::new(
            config.default_language.clone(),
            Vec::new(),
        ))
        .with_run_ordering(config.run_ordering),
    );

    let workspace = Workspace::new(store, engine, storage);
    workspace.restore()?;
    Ok(workspace)
}

pub fn create_app(workspace: Workspace) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/workspace", get(get_workspace))
        .route("/workspace/actions", post(dispatch_action))
        .route("/workspace/run", post(run_code))
        .route("/workspace/save", post(save_current_file))
        .route("/workspace/files", post(create_file))
        .route("/workspace/files/{id}", delete(delete_file))
        .route("/workspace/files/{id}/open", post(open_file))
        .route("/workspace/files/{id}/rename", post(rename_file))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { workspace })
}

/// Tag every request with a correlation id and run it inside a span carrying it
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Code Workspace Service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /workspace": "Current workspace state",
            "POST /workspace/actions": "Apply one workspace action",
            "POST /workspace/run": "Run the buffer on the execution engine",
            "POST /workspace/save": "Commit the buffer into the current file",
            "POST /workspace/files": "Create a file",
            "POST /workspace/files/{id}/open": "Open a file into the buffer",
            "POST /workspace/files/{id}/rename": "Rename a file",
            "DELETE /workspace/files/{id}": "Delete a file",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_workspace(State(state): State<AppState>) -> Json<WorkspaceResponse> {
    Json(state.workspace.snapshot().into())
}

async fn dispatch_action(
    State(state): State<AppState>,
    Json(action): Json<Action>,
) -> ApiResult<WorkspaceResponse> {
    if action.is_run_outcome() {
        warn!(action = action.kind(), "Rejected run-owned action");
        return Err(bad_request_error(
            "Loading and result are set by runs; use POST /workspace/run",
        ));
    }

    info!(action = action.kind(), "Dispatching action");
    Ok(Json(state.workspace.dispatch(action).into()))
}

async fn run_code(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let run = state
        .workspace
        .start_run()
        .map_err(|e| workspace_error("Failed to start run", e))?;
    let language = run.language().to_string();
    let ticket = run.ticket().sequence();

    tokio::spawn(run.execute());

    info!(run = ticket, language = %language, "Run started");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "running",
            "run": ticket,
            "language": language
        })),
    ))
}

async fn save_current_file(State(state): State<AppState>) -> ApiResult<SaveResponse> {
    match state.workspace.save() {
        Ok(Some(files)) => Ok(Json(SaveResponse { files })),
        Ok(None) => Err(bad_request_error("No file selected")),
        Err(e) => Err(workspace_error("Failed to save file", e)),
    }
}

async fn create_file(
    State(state): State<AppState>,
    Json(request): Json<CreateFileRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(bad_request_error("File name cannot be empty"));
    }

    let file = state
        .workspace
        .create_file(name, request.language)
        .map_err(|e| workspace_error("Failed to create file", e))?;

    Ok((StatusCode::CREATED, Json(json!(file))))
}

async fn open_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<WorkspaceResponse> {
    state
        .workspace
        .open_file(&file_id)
        .map_err(|e| workspace_error("Failed to open file", e))?;
    Ok(Json(state.workspace.snapshot().into()))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<WorkspaceResponse> {
    state
        .workspace
        .delete_file(&file_id)
        .map_err(|e| workspace_error("Failed to delete file", e))?;
    Ok(Json(state.workspace.snapshot().into()))
}

async fn rename_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Json(request): Json<RenameFileRequest>,
) -> ApiResult<Value> {
    if request.name.trim().is_empty() {
        return Err(bad_request_error("File name cannot be empty"));
    }

    let workspace = &state.workspace;
    workspace
        .start_rename(&file_id)
        .map_err(|e| workspace_error("Failed to rename file", e))?;
    workspace.set_new_file_name(request.name);

    match workspace.commit_rename() {
        Ok(Some(file)) => Ok(Json(json!(file))),
        Ok(None) => Err(bad_request_error("Rename was not committed")),
        Err(e) => Err(workspace_error("Failed to rename file", e)),
    }
}
