//! End-to-end ingestion and search against a real Qdrant instance and
//! SQLite registry, with a deterministic mock embedding provider standing
//! in for the HTTP embedding client (§8, scenario-style coverage). Skipped
//! if Docker is unavailable, following `memory`'s own Qdrant integration
//! tests.

use std::sync::Arc;
use std::time::Duration;

use memory::{HttpEmbeddingProvider, IngestionPipeline, MockEmbeddingProvider, QdrantVectorIndex, SearchEngine};
use mk_core::traits::{ContentStore, MetadataRegistry, VectorIndex};
use mk_core::{Gmid, IndexState, MediaRecord, MediaType};
use storage::{FsContentStore, SqliteRegistry};

type Pipeline = IngestionPipeline<FsContentStore, SqliteRegistry, MockEmbeddingProvider, QdrantVectorIndex>;
type Search = SearchEngine<Arc<MockEmbeddingProvider>, Arc<QdrantVectorIndex>>;

fn sample_record(gmid: Gmid, thumbnail_path: String, description: &str) -> MediaRecord {
    MediaRecord {
        gmid,
        original_name: "beach.jpg".to_string(),
        stored_path: "photos/2026-07-27/beach_1.jpg".to_string(),
        thumbnail_path,
        media_type: MediaType::Photo,
        size_bytes: 4096,
        width: Some(800),
        height: Some(600),
        duration_ms: None,
        upload_time: chrono::Utc::now(),
        description: description.to_string(),
        index_state: IndexState::ThumbnailReady,
        index_attempts: 0,
        last_error: None
    }
}

/// Drives a single GMID all the way from `thumbnail_ready` to `indexed`,
/// then confirms Mode A and Mode C both surface it, matching the upload
/// scenarios in §8 without driving it through the HTTP layer.
#[tokio::test]
async fn upload_then_text_search_then_similar_search() {
    let Some(fixture) = testing::qdrant().await else {
        eprintln!("Skipping media-service integration test: Docker not available");
        return;
    };

    let content_root = testing::content_root();
    let content = Arc::new(FsContentStore::new(content_root.path()));
    let registry = Arc::new(SqliteRegistry::connect("sqlite::memory:").await.unwrap());
    let embeddings = Arc::new(MockEmbeddingProvider::new(8));
    let index = Arc::new(
        QdrantVectorIndex::connect(fixture.http_url(), testing::unique_collection_name(), false).unwrap()
    );
    index.ensure_collection(8).await.expect("ensure_collection failed");

    let gmid = Gmid::from_content(b"beach sunset photo");
    let thumbnail_path = content
        .store_thumbnail(&gmid, b"fake jpeg thumbnail bytes")
        .await
        .expect("store_thumbnail failed");
    registry
        .put(sample_record(gmid.clone(), thumbnail_path.display().to_string(), "sunset at the beach"))
        .await
        .unwrap();

    let (pipeline, handles): (Pipeline, _) =
        Pipeline::spawn(content.clone(), registry.clone(), embeddings.clone(), index.clone(), 1, 16, 3);
    pipeline.enqueue(gmid.clone()).expect("enqueue failed");

    wait_until_indexed(&registry, &gmid).await;

    let search = Search::new(embeddings.clone(), index.clone(), config::SearchConfig {
        text_to_text_threshold: -1.0,
        text_to_image_threshold: -1.0,
        image_search_threshold: -1.0,
        default_limit: 20
    });

    let text_response = search.search_text("sunset at the beach", None).await.expect("search_text failed");
    assert!(text_response.results.iter().any(|hit| hit.gmid == gmid));

    let similar_response = search.search_similar(&gmid, None).await.expect("search_similar failed");
    assert!(similar_response.results.iter().all(|hit| hit.gmid != gmid));

    for handle in handles {
        handle.abort();
    }
}

async fn wait_until_indexed(registry: &SqliteRegistry, gmid: &Gmid) {
    for _ in 0..50 {
        if let Ok(Some(record)) = registry.get(gmid).await {
            if record.index_state == IndexState::Indexed {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("record never reached indexed state");
}

/// Confirms `HttpEmbeddingProvider` is at least constructible against the
/// same config media-service wires it with, without a real server to embed
/// against (exercised against a real provider in `memory`'s own tests).
#[test]
fn http_embedding_provider_constructs_from_default_config() {
    let _provider = HttpEmbeddingProvider::new(&config::EmbeddingConfig::default());
}
