use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::core::{Orchestrator, RunStatus, WorkspaceError};
use crate::domain::{Phase, RequestError, RunRequest};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub type SharedState = Arc<AppState>;

// ── Request / response payloads ───────────────────────────────────────

#[derive(Deserialize)]
pub struct ListFilesQuery {
    pub run_id: String,
}

#[derive(Deserialize)]
pub struct ArtifactQuery {
    pub run_id: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct PhaseDescriptor {
    pub id: Phase,
    pub name: &'static str,
    pub description: &'static str,
    pub outputs: Vec<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            WorkspaceError::ArtifactNotFound { .. } => {
                ApiError::NotFound("File not found".to_string())
            }
            WorkspaceError::InvalidRunId(_) | WorkspaceError::InvalidFileName(_) => {
                ApiError::BadRequest(err.to_string())
            }
            WorkspaceError::Io { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/run_pipeline", post(run_pipeline))
        .route("/resume_pipeline", post(resume_pipeline))
        .route("/pipeline-status/{run_id}", get(pipeline_status))
        .route("/phases", get(list_phases))
        .route("/run-ids", get(list_run_ids))
        .route("/list-files", get(list_files))
        .route("/view", get(view_file))
        .route("/download", get(download_file))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn run_pipeline(
    State(state): State<SharedState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let config = request.into_config()?;
    let phases = config.ordered_phases();

    if state.orchestrator.should_skip(&config).await? {
        info!(run_id = %config.run_id, "Outputs already exist, not starting run");
        return Ok(Json(json!({
            "status": "skipped",
            "test_run_id": config.run_id,
            "reason": "Output already exists",
        })));
    }

    info!(run_id = %config.run_id, ?phases, "Starting pipeline run");
    let response = json!({
        "status": "started",
        "test_run_id": config.run_id,
        "phases": phases,
        "target_page_count": config.target_page_count,
        "phase_count": phases.len(),
    });
    state.orchestrator.spawn(config);

    Ok(Json(response))
}

async fn resume_pipeline(
    State(state): State<SharedState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let config = request.into_resume_config()?;
    let hints = state.orchestrator.resume_hints(&config.run_id).await?;
    if hints.is_empty() {
        warn!(run_id = %config.run_id, "No checkpoint found, resuming from scratch");
    }

    let phases = config.ordered_phases();
    info!(run_id = %config.run_id, existing_pages = hints.total_pages, "Resuming pipeline run");

    let response = json!({
        "status": "resumed",
        "test_run_id": config.run_id,
        "phases": phases,
        "target_page_count": config.target_page_count,
        "resume_from": hints.resume_from(),
        "existing_pages": hints.total_pages,
    });
    state.orchestrator.spawn_resume(config);

    Ok(Json(response))
}

async fn pipeline_status(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatus>, ApiError> {
    let orchestrator = &state.orchestrator;
    let status =
        RunStatus::collect(orchestrator.workspace(), orchestrator.validator(), &run_id).await?;
    Ok(Json(status))
}

async fn list_phases(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let validator = state.orchestrator.validator();
    let phases: Vec<PhaseDescriptor> = Phase::ALL
        .into_iter()
        .map(|phase| PhaseDescriptor {
            id: phase,
            name: phase.title(),
            description: phase.description(),
            outputs: validator
                .contract(phase.as_str())
                .map(|c| c.outputs())
                .unwrap_or_default(),
        })
        .collect();
    Json(json!({"phases": phases}))
}

async fn list_run_ids(State(state): State<SharedState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.orchestrator.workspace().list_runs().await?))
}

async fn list_files(
    State(state): State<SharedState>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(
        state.orchestrator.workspace().list_files(&query.run_id).await?,
    ))
}

/// Artifact rendered for a browser: JSON parsed, markdown as text
async fn view_file(
    State(state): State<SharedState>,
    Query(query): Query<ArtifactQuery>,
) -> Result<Response, ApiError> {
    let path = state
        .orchestrator
        .workspace()
        .artifact_path(&query.run_id, &query.filename)
        .await?;
    let bytes = read_artifact(&path).await?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if extension.eq_ignore_ascii_case("json") {
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => return Ok(Json(value).into_response()),
            Err(e) => warn!(file = %path.display(), error = %e, "Artifact is not valid JSON, serving as text"),
        }
        return Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], bytes).into_response());
    }

    let content_type = if extension.eq_ignore_ascii_case("md") {
        "text/markdown; charset=utf-8".to_string()
    } else {
        mime_guess::from_path(&path).first_or_octet_stream().to_string()
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Artifact as an attachment
async fn download_file(
    State(state): State<SharedState>,
    Query(query): Query<ArtifactQuery>,
) -> Result<Response, ApiError> {
    let path = state
        .orchestrator
        .workspace()
        .artifact_path(&query.run_id, &query.filename)
        .await?;
    let bytes = read_artifact(&path).await?;

    let content_type = mime_guess::from_path(&path).first_or_octet_stream().to_string();
    let disposition = format!("attachment; filename=\"{}\"", query.filename.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn read_artifact(path: &std::path::Path) -> Result<Vec<u8>, ApiError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read {}: {}", path.display(), e)))
}
