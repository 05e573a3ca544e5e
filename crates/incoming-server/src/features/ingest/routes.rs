//! Ingestion trigger routes
//!
//! Every route answers `201 Created` with the run's outcome. A failed run is
//! still a processed request: its outcome carries `"status": "error"`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::ingest::models::{file_name_of, IngestOutcome};
use crate::ingest::IngestOrchestrator;

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

impl PathRequest {
    fn validated(self) -> Result<String, AppError> {
        let path = self.path.trim();
        if path.is_empty() {
            return Err(AppError::BadRequest("path is required".to_string()));
        }
        Ok(path.to_string())
    }
}

pub fn ingest_routes() -> Router<Arc<IngestOrchestrator>> {
    Router::new()
        .route("/path", post(ingest_path))
        .route("/folder", post(ingest_folder))
        .route(
            "/file",
            post(ingest_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/remote", post(ingest_remote))
        .route("/remote-folder", post(ingest_remote_folder))
}

/// POST /ingest/path
async fn ingest_path(
    State(orchestrator): State<Arc<IngestOrchestrator>>,
    Json(request): Json<PathRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>), AppError> {
    let path = request.validated()?;
    let outcome = orchestrator.ingest_local_path(&path).await;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /ingest/folder
async fn ingest_folder(
    State(orchestrator): State<Arc<IngestOrchestrator>>,
    Json(request): Json<PathRequest>,
) -> Result<(StatusCode, Json<Vec<IngestOutcome>>), AppError> {
    let path = request.validated()?;
    let outcomes = orchestrator.ingest_local_folder(&path).await;
    Ok((StatusCode::CREATED, Json(outcomes)))
}

/// POST /ingest/remote
async fn ingest_remote(
    State(orchestrator): State<Arc<IngestOrchestrator>>,
    Json(request): Json<PathRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>), AppError> {
    let path = request.validated()?;
    let outcome = orchestrator.ingest_remote_path(&path).await;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /ingest/remote-folder
async fn ingest_remote_folder(
    State(orchestrator): State<Arc<IngestOrchestrator>>,
    Json(request): Json<PathRequest>,
) -> Result<(StatusCode, Json<Vec<IngestOutcome>>), AppError> {
    let path = request.validated()?;
    let outcomes = orchestrator.ingest_remote_folder(&path).await;
    Ok((StatusCode::CREATED, Json(outcomes)))
}

/// POST /ingest/file (multipart)
///
/// The first part carrying a file name is saved under its base name in a
/// temporary directory and ingested from there, so the ledger sees the
/// uploaded name.
async fn ingest_upload(
    State(orchestrator): State<Arc<IngestOrchestrator>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestOutcome>), AppError> {
    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(|name| file_name_of(name).to_string()) else {
            continue;
        };
        if file_name.is_empty() || file_name == "." || file_name == ".." {
            return Err(AppError::BadRequest("invalid file name".to_string()));
        }

        let data = field.bytes().await?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(&file_name);
        tokio::fs::write(&path, &data).await?;
        tracing::info!(file = %file_name, bytes = data.len(), "Upload received");

        let outcome = orchestrator
            .ingest_local_path(&path.to_string_lossy())
            .await;
        return Ok((StatusCode::CREATED, Json(outcome)));
    }

    Err(AppError::BadRequest("a file part is required".to_string()))
}
