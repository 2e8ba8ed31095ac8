//! bindery - Word to PDF merge service
//!
//! Converts uploaded Word documents to PDF through an external conversion
//! engine, merges them into a single file, and keeps the result under the
//! uploading user's storage partition.

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bindery::services::LogBufferLayer;
use bindery::{api, config, AppState, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; the buffer layer feeds the /logs page.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bindery=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(LogBufferLayer::global())
        .init();

    // Load configuration
    let config = config::init();
    tracing::info!(
        "Starting bindery server on {}:{}",
        config.server.host,
        config.server.port
    );

    // Initialize application state (database, conversion engine, storage)
    let state = AppState::new().await?;
    tracing::info!(engine = state.engine.name(), "Application state initialized");

    api::status::init_startup_time();

    // Build router
    let app = Router::new()
        .merge(api::routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(config.storage.max_upload_size))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid address");

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
