//! Application state for bindery.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;

use crate::db::DbPool;
use crate::services::{ArtifactStore, ConversionEngine, JobPipeline};
use crate::{config, db, services, Result};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Document conversion engine, selected at startup.
    pub engine: Arc<dyn ConversionEngine>,
    /// Per-user artifact storage.
    pub store: Arc<ArtifactStore>,
    /// Upload-and-convert pipeline.
    pub pipeline: JobPipeline,
}

impl AppState {
    /// Create a new application state, initializing all services.
    pub async fn new() -> Result<Self> {
        let config = config::config();

        let db = db::init_pool(&config.database.path).await?;
        db::initialize_schema(&db).await?;

        let engine = services::detect_engine(&config.convert).await?;
        let store = Arc::new(ArtifactStore::new(&config.storage.data_dir));
        let pipeline = JobPipeline::new(db.clone(), engine.clone(), store.clone());

        Ok(Self {
            db,
            engine,
            store,
            pipeline,
        })
    }

    /// Assemble state from pre-built parts. Tests use this to inject an
    /// in-memory database and a stub engine.
    pub fn from_parts(
        db: DbPool,
        engine: Arc<dyn ConversionEngine>,
        store: Arc<ArtifactStore>,
    ) -> Self {
        let pipeline = JobPipeline::new(db.clone(), engine.clone(), store.clone());
        Self {
            db,
            engine,
            store,
            pipeline,
        }
    }
}
