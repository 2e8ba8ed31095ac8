//! Job Routes
//!
//! Upload, preview ordering, conversion start, and progress polling.
//! All routes require a session.
//!
//! Routes:
//! - POST /upload - Upload a ZIP archive of documents, returns the preview
//! - POST /upload-folder - Upload a folder selection, returns the preview
//! - POST /convert/:job_id - Start conversion in the submitted order
//! - GET /progress/:job_id - Live progress for polling

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::config;
use crate::middleware::SessionUser;
use crate::models::JobProgress;
use crate::services::Preview;
use crate::{AppState, Error, Result};

/// Build job routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_archive))
        .route("/upload-folder", post(upload_folder))
        .route("/convert/:job_id", post(start_convert))
        .route("/progress/:job_id", get(progress))
}

/// Request body for starting a previewed job.
#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    /// Indices into the preview listing, in the desired merge order
    pub order: Vec<usize>,
}

/// Upload a ZIP archive of documents.
///
/// POST /upload
///
/// Accepts multipart/form-data with a single file field named "file".
#[axum::debug_handler]
async fn upload_archive(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    mut multipart: Multipart,
) -> Result<Json<Preview>> {
    let config = config();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name().unwrap_or_default() != "file" {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "upload.zip".into());
        if !filename.to_lowercase().ends_with(".zip") {
            return Err(Error::InvalidInput("A ZIP archive is required".into()));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("Failed to read file: {}", e)))?;
        if data.len() > config.storage.max_upload_size {
            return Err(Error::FileTooLarge {
                max_size: config.storage.max_upload_size,
            });
        }

        let preview = state
            .pipeline
            .prepare_archive(&user.user_id, data.to_vec(), &filename)
            .await?;
        return Ok(Json(preview));
    }

    Err(Error::InvalidInput("No file provided".into()))
}

/// Upload a folder selection of documents.
///
/// POST /upload-folder
///
/// Accepts multipart/form-data with repeated "files" fields whose filenames
/// carry the relative paths. Unsupported files are skipped.
#[axum::debug_handler]
async fn upload_folder(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    mut multipart: Multipart,
) -> Result<Json<Preview>> {
    let config = config();

    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    let mut total_bytes = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name().unwrap_or_default() != "files" {
            continue;
        }
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("Failed to read file: {}", e)))?;
        total_bytes += data.len();
        if total_bytes > config.storage.max_upload_size {
            return Err(Error::FileTooLarge {
                max_size: config.storage.max_upload_size,
            });
        }

        files.push((filename, data.to_vec()));
    }

    if files.is_empty() {
        return Err(Error::InvalidInput("No files provided".into()));
    }

    let preview = state.pipeline.prepare_files(&user.user_id, files).await?;
    Ok(Json(preview))
}

/// Start conversion of a previewed job.
///
/// POST /convert/:job_id
#[axum::debug_handler]
async fn start_convert(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(job_id): Path<String>,
    Json(req): Json<ConvertRequest>,
) -> Result<Json<Value>> {
    if req.order.is_empty() {
        return Err(Error::InvalidInput("Select at least one document".into()));
    }

    state
        .pipeline
        .start(&job_id, &user.user_id, &req.order)
        .await?;

    Ok(Json(json!({ "job_id": job_id, "stage": "processing" })))
}

/// Live progress for a job.
///
/// GET /progress/:job_id
#[axum::debug_handler]
async fn progress(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(job_id): Path<String>,
) -> Result<Json<JobProgress>> {
    let progress = state.pipeline.status(&job_id, &user.user_id).await?;
    Ok(Json(progress))
}
