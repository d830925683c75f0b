//! Application context shared by every request handler

use crate::config::{AppConfig, StorageBackend};
use crate::metrics::PipelineMetrics;
use crate::models::inference::InferenceEngine;
use crate::pipeline::PredictionPipeline;
use crate::store::{MemoryStore, PredictionStore, SqliteStore};
use crate::uploads::UploadStorage;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Everything a handler needs, built once at startup.
pub struct AppContext {
    pub pipeline: PredictionPipeline,
    pub uploads: UploadStorage,
    pub metrics: Arc<PipelineMetrics>,
    /// Header carrying the authenticated user id
    pub owner_header: String,
    /// Entries shown in "recent" views
    pub recent_limit: usize,
}

impl AppContext {
    /// Load models, open storage and wire the pipeline from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let engine = InferenceEngine::from_config(&config.models)?;

        let store: Arc<dyn PredictionStore> = match config.storage.backend {
            StorageBackend::Sqlite => Arc::new(
                SqliteStore::open(&config.storage.database_path).with_context(|| {
                    format!(
                        "failed to open database {}",
                        config.storage.database_path.display()
                    )
                })?,
            ),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        info!(backend = ?config.storage.backend, "Prediction store ready");

        let uploads = UploadStorage::new(&config.storage.upload_dir, Arc::clone(&store))
            .context("failed to prepare upload directory")?;

        Ok(Self::with_components(
            Arc::new(engine),
            store,
            uploads,
            &config.server.owner_header,
            config.history.recent_limit,
        ))
    }

    /// Assemble a context from already-built parts
    pub fn with_components(
        engine: Arc<InferenceEngine>,
        store: Arc<dyn PredictionStore>,
        uploads: UploadStorage,
        owner_header: &str,
        recent_limit: usize,
    ) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let pipeline = PredictionPipeline::new(engine, store, Arc::clone(&metrics));

        Self {
            pipeline,
            uploads,
            metrics,
            owner_header: owner_header.to_ascii_lowercase(),
            recent_limit,
        }
    }
}
