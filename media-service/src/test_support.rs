//! Test-only helpers for building an `AppState` without a running Qdrant or
//! embedding provider. `QdrantVectorIndex::connect` is lazy (it only builds
//! a client, never dials out), so handler tests that don't exercise search
//! or ingestion end-to-end can use this directly.
#![cfg(test)]

use std::sync::Arc;

use config::AppConfig;
use memory::{HttpEmbeddingProvider, QdrantVectorIndex};
use storage::{FsContentStore, SqliteRegistry};

use crate::state::{AppState, Pipeline, Search};

pub async fn test_state(configure: impl FnOnce(&mut AppConfig)) -> (AppState, tempfile::TempDir) {
    let mut config = AppConfig::default();
    configure(&mut config);

    let registry = Arc::new(SqliteRegistry::connect("sqlite::memory:").await.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let content = Arc::new(FsContentStore::new(dir.path()));
    let embeddings = Arc::new(HttpEmbeddingProvider::new(&config.embedding));
    let index = Arc::new(QdrantVectorIndex::connect("http://localhost:6334", "test".to_string(), false).unwrap());
    // Zero workers: handler tests only need `enqueue`/`reconcile` to accept
    // work, not for it to actually execute (that's `memory::pipeline`'s own
    // test suite) — a live worker would race the registry mutations these
    // tests assert on against the HTTP provider and Qdrant address below,
    // neither of which is actually running.
    let (pipeline, handles) =
        Pipeline::spawn(content.clone(), registry.clone(), embeddings.clone(), index.clone(), 0, 16, 1);
    let search = Arc::new(Search::new(embeddings.clone(), index.clone(), config.search));

    let state = AppState {
        config: Arc::new(config),
        content,
        registry,
        embeddings,
        index,
        pipeline,
        search,
        worker_handles: tokio::sync::Mutex::new(handles)
    };
    (state, dir)
}
