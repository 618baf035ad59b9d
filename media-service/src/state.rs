//! Application state: wires the concrete C1-C6 backends together and
//! exposes them to the HTTP handlers behind a single `Arc<AppState>`.

use std::sync::Arc;

use config::AppConfig;
use memory::{HttpEmbeddingProvider, IngestionPipeline, QdrantVectorIndex, SearchEngine};
use storage::{FsContentStore, SqliteRegistry};

/// The concrete ingestion pipeline: a filesystem content store, a SQLite
/// registry, an HTTP embedding provider and a Qdrant vector index.
pub type Pipeline = IngestionPipeline<FsContentStore, SqliteRegistry, HttpEmbeddingProvider, QdrantVectorIndex>;

/// The concrete search engine. It takes `E`/`V` by value, so it's
/// instantiated over `Arc<...>` (blanket-implemented in `mk_core`) to share
/// the same provider/index instances the pipeline holds.
pub type Search = SearchEngine<Arc<HttpEmbeddingProvider>, Arc<QdrantVectorIndex>>;

/// Shared application state threaded through every HTTP handler (§9:
/// avoid singletons, pass a small app-context struct instead).
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub content: Arc<FsContentStore>,
    pub registry: Arc<SqliteRegistry>,
    pub embeddings: Arc<HttpEmbeddingProvider>,
    pub index: Arc<QdrantVectorIndex>,
    pub pipeline: Pipeline,
    pub search: Arc<Search>,
    pub(crate) worker_handles: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>
}

/// Bootstrap failures, mapped to the exit codes in spec §6 by `server::run`.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("configuration invalid: {0}")]
    Config(#[from] validator::ValidationErrors),

    #[error("content root inaccessible: {0}")]
    ContentRoot(std::io::Error),

    #[error("vector database unreachable at startup: {0}")]
    VectorDb(#[from] errors::VectorIndexError),

    #[error("registry unavailable at startup: {0}")]
    Registry(#[from] errors::StorageError)
}

impl AppState {
    /// Validates configuration, opens the content root, connects to the
    /// registry and vector database, ensures the collection exists, spawns
    /// the ingestion worker pool, and runs the startup reconciliation scan.
    pub async fn bootstrap(config: AppConfig) -> Result<Arc<Self>, BootstrapError> {
        config.validate_all()?;

        std::fs::create_dir_all(&config.content.content_root).map_err(BootstrapError::ContentRoot)?;
        let content = Arc::new(FsContentStore::new(&config.content.content_root));

        let registry_url = format!("sqlite://{}/registry.sqlite?mode=rwc", config.content.content_root);
        let registry = Arc::new(SqliteRegistry::connect(&registry_url).await?);

        let embeddings = Arc::new(HttpEmbeddingProvider::new(&config.embedding));

        let index = Arc::new(QdrantVectorIndex::connect(
            &config.vector_db.url,
            config.vector_db.collection_name.clone(),
            config.vector_db.fix_dimension_on_mismatch
        )?);
        if config.vector_db.require_index_on_start {
            index.ensure_collection(config.embedding.embedding_dim).await?;
        }

        let (pipeline, worker_handles) = Pipeline::spawn(
            content.clone(),
            registry.clone(),
            embeddings.clone(),
            index.clone(),
            config.ingestion.worker_count,
            config.ingestion.queue_capacity,
            config.ingestion.max_embedding_attempts
        );

        match pipeline.reconcile().await {
            Ok(requeued) => tracing::info!(requeued, "startup reconciliation complete"),
            Err(e) => tracing::warn!(error = %e, "startup reconciliation failed")
        }

        let search = Arc::new(Search::new(embeddings.clone(), index.clone(), config.search));

        Ok(Arc::new(Self {
            config: Arc::new(config),
            content,
            registry,
            embeddings,
            index,
            pipeline,
            search,
            worker_handles: tokio::sync::Mutex::new(worker_handles)
        }))
    }

    /// Aborts the ingestion worker pool. An item caught mid-flight is left
    /// in `embedding_in_flight`, which the next startup's reconciliation
    /// scan demotes back to `thumbnail_ready` (§5: cancellation leaves the
    /// record in a state the reconciler already knows how to recover).
    pub async fn shutdown_workers(&self) {
        let handles = std::mem::take(&mut *self.worker_handles.lock().await);
        for handle in handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.search.text_to_text_threshold = 5.0;
        let err = AppState::bootstrap(config).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Config(_)));
    }
}
