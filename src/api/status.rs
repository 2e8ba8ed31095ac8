//! Status Routes
//!
//! Health check and the in-process log page.
//!
//! Routes:
//! - GET /health - Basic health check with uptime
//! - GET /logs - Most recent log lines (plain HTML)

use std::sync::OnceLock;
use std::time::Instant;

use axum::{response::Html, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::services::recent_log_lines;
use crate::AppState;

static STARTUP_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize startup time. Call this once at server start.
pub fn init_startup_time() {
    let _ = STARTUP_TIME.get_or_init(Instant::now);
}

fn uptime_seconds() -> u64 {
    STARTUP_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/logs", get(logs_page))
}

/// Basic health check.
///
/// GET /health
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Recent in-process log lines.
///
/// GET /logs
async fn logs_page() -> Html<String> {
    let lines = recent_log_lines();

    let body = if lines.is_empty() {
        "<p>No log entries yet. Run a conversion and refresh.</p>".to_string()
    } else {
        let escaped: String = lines
            .iter()
            .map(|line| escape_html(line))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "<pre style='font-size:12px;white-space:pre-wrap'>{}</pre>",
            escaped
        )
    };

    Html(format!(
        "<!DOCTYPE html><html><head><meta charset='utf-8'><title>Logs</title></head>\
         <body><h2>Recent logs</h2>{}</body></html>",
        body
    ))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
