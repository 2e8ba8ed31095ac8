//! API Routes for bindery
//!
//! This module combines all routes into a single router.
//! Routes are organized by domain and apply appropriate middleware.

mod auth;
mod files;
mod jobs;
mod pages;
pub mod status;

use axum::Router;

use crate::middleware::require_session;
use crate::AppState;

/// Build the complete router.
///
/// Route structure:
/// - /, /login - HTML pages (session optional)
/// - /register, /login, /logout, /api/me - Authentication
/// - /upload, /upload-folder, /convert/:id, /progress/:id - Jobs (session-protected)
/// - /api/my-files, /download/:id - Artifacts (session-protected)
/// - /health, /logs - Health and diagnostics (public)
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health and diagnostics (public)
        .merge(status::routes())
        // HTML pages
        .merge(pages::routes(state.clone()))
        // Authentication routes (mixed public/protected)
        .merge(auth::routes(state.clone()))
        // Protected job and file routes
        .merge(protected_routes(state))
}

/// Protected routes that require a valid session.
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(jobs::routes())
        .merge(files::routes())
        .layer(axum::middleware::from_fn_with_state(state, require_session))
}
