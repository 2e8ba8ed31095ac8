//! File Routes
//!
//! The "My Files" listing and artifact downloads. All routes require a
//! session and only ever see the caller's own partition.
//!
//! Routes:
//! - GET /api/my-files - Completed jobs, newest first
//! - GET /download/:job_id - Download a finished PDF

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::Response,
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;

use crate::middleware::SessionUser;
use crate::{db, AppState, Error, Result};

/// Build file routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/my-files", get(my_files))
        .route("/download/:job_id", get(download))
}

/// One entry of the "My Files" listing.
#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub job_id: String,
    pub filename: String,
    pub total_pages: Option<i64>,
    pub created_at: String,
}

/// Listing response.
#[derive(Debug, Serialize)]
pub struct MyFilesResponse {
    pub files: Vec<FileEntry>,
}

/// List the caller's completed jobs.
///
/// GET /api/my-files
#[axum::debug_handler]
async fn my_files(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Json<MyFilesResponse>> {
    let jobs = db::list_completed_jobs(&state.db, &user.user_id).await?;

    let files = jobs
        .into_iter()
        .map(|job| FileEntry {
            job_id: job.id,
            filename: job.filename,
            total_pages: job.total_pages,
            created_at: job.created_at.chars().take(19).collect(),
        })
        .collect();

    Ok(Json(MyFilesResponse { files }))
}

/// Download a finished PDF.
///
/// GET /download/:job_id
#[axum::debug_handler]
async fn download(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(job_id): Path<String>,
) -> Result<Response> {
    let (path, filename) = state
        .pipeline
        .artifact_for_download(&job_id, &user.user_id)
        .await?;

    let data = tokio::fs::read(&path)
        .await
        .map_err(|_| Error::FileNotFound(filename.clone()))?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .header(header::CONTENT_LENGTH, data.len())
        .body(Body::from(data))
        .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
