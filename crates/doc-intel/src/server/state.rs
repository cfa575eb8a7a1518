//! Application state for the document analysis server

use std::sync::Arc;

use crate::analysis::{DocumentAnalyzer, GeminiClient};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::processing::{ProcessingService, RecoveryScanner, RetryPolicy};
use crate::store::{DocumentStore, SqliteDocumentStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PipelineConfig,
    store: Arc<dyn DocumentStore>,
    pipeline: ProcessingService,
}

impl AppState {
    /// Create the application state: open the store, construct the provider
    /// client (fails fast when credentials are absent), start the worker
    /// pool and the recovery sweep.
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage.upload_dir).await?;

        let store: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::new(&config.storage.database_path)?);
        tracing::info!(
            "Document store opened at {}",
            config.storage.database_path.display()
        );

        let analyzer: Arc<dyn DocumentAnalyzer> =
            Arc::new(GeminiClient::new(config.analysis.clone())?);
        tracing::info!(
            "Analysis client initialized (models: {})",
            config.analysis.models.join(", ")
        );

        let policy = RetryPolicy::new(
            config.processing.attempt_ceiling,
            config.analysis.backoff_base(),
            config.analysis.backoff_cap(),
        );
        let pipeline = ProcessingService::new(
            Arc::clone(&store),
            analyzer,
            policy,
            config.processing.max_concurrent,
            config.storage.upload_dir.clone(),
        );
        tracing::info!(
            "Processing pipeline started ({} concurrent jobs, {} attempts max)",
            config.processing.max_concurrent,
            config.processing.attempt_ceiling
        );

        // The first sweep tick fires immediately and re-enqueues any work a
        // previous process left behind.
        RecoveryScanner::new(
            Arc::clone(&store),
            pipeline.clone(),
            config.processing.attempt_ceiling,
            config.processing.recovery_interval(),
        )
        .spawn();
        tracing::info!(
            "Recovery sweep scheduled every {}s",
            config.processing.recovery_interval_secs
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                pipeline,
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Get the document store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    /// Get the processing pipeline handle
    pub fn pipeline(&self) -> &ProcessingService {
        &self.inner.pipeline
    }
}
