//! Ingestion pipeline (C5, §4.5): drives an uploaded record through
//! `pending → thumbnail_ready → embedding_in_flight → indexed`, with retry
//! loops back to `thumbnail_ready` and a terminal `failed` state.

use mk_core::traits::{ContentStore, EmbeddingProvider, MetadataRegistry, VectorIndex};
use mk_core::{Gmid, IndexState, NamedVector};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct IngestionPipeline<C, R, E, V> {
    content: Arc<C>,
    registry: Arc<R>,
    embeddings: Arc<E>,
    index: Arc<V>,
    max_attempts: u32,
    sender: mpsc::Sender<Gmid>
}

impl<C, R, E, V> Clone for IngestionPipeline<C, R, E, V> {
    fn clone(&self) -> Self {
        Self {
            content: self.content.clone(),
            registry: self.registry.clone(),
            embeddings: self.embeddings.clone(),
            index: self.index.clone(),
            max_attempts: self.max_attempts,
            sender: self.sender.clone()
        }
    }
}

impl<C, R, E, V> IngestionPipeline<C, R, E, V>
where
    C: ContentStore + Send + Sync + 'static,
    C::Error: std::fmt::Display,
    R: MetadataRegistry + Send + Sync + 'static,
    R::Error: std::fmt::Display,
    E: EmbeddingProvider + Send + Sync + 'static,
    E::Error: std::fmt::Display,
    V: VectorIndex + Send + Sync + 'static,
    V::Error: std::fmt::Display
{
    /// Spawns `worker_count` tasks pulling GMIDs from a bounded channel of
    /// `queue_capacity`, returning the pipeline handle and the workers'
    /// join handles so the caller can await shutdown.
    pub fn spawn(
        content: Arc<C>,
        registry: Arc<R>,
        embeddings: Arc<E>,
        index: Arc<V>,
        worker_count: usize,
        queue_capacity: usize,
        max_attempts: u32
    ) -> (Self, Vec<tokio::task::JoinHandle<()>>) {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let content = content.clone();
            let registry = registry.clone();
            let embeddings = embeddings.clone();
            let index = index.clone();
            let receiver = receiver.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let gmid = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(gmid) = gmid else { break };
                    info!(worker_id, gmid = %gmid, "processing ingestion item");
                    let started = std::time::Instant::now();
                    let outcome = process_item(
                        &*content,
                        &*registry,
                        &*embeddings,
                        &*index,
                        &gmid,
                        max_attempts
                    )
                    .await;
                    metrics::histogram!("ingestion_item_duration_seconds").record(started.elapsed().as_secs_f64());
                    if let Err(e) = outcome {
                        metrics::counter!("ingestion_items_failed_total").increment(1);
                        warn!(worker_id, gmid = %gmid, error = %e, "ingestion item failed");
                    } else {
                        metrics::counter!("ingestion_items_processed_total").increment(1);
                    }
                }
            }));
        }

        let pipeline = Self { content, registry, embeddings, index, max_attempts, sender };
        (pipeline, handles)
    }

    /// Enqueues a GMID for ingestion. Upload handlers call this without
    /// awaiting completion (§4.5); a full queue surfaces as a 503 upstream.
    pub fn enqueue(&self, gmid: Gmid) -> Result<(), mpsc::error::TrySendError<Gmid>> {
        self.sender.try_send(gmid)
    }

    /// Scans the registry for non-terminal records and re-enqueues them
    /// (§4.5 reconciliation). Also checks every `indexed` record against the
    /// vector index itself: one whose point is missing (e.g. the collection
    /// was dropped and recreated on a dimension mismatch) is CASed back to
    /// `thumbnail_ready` and re-enqueued, since otherwise it would stay
    /// `indexed` and permanently unsearchable.
    pub async fn reconcile(&self) -> Result<usize, R::Error> {
        let mut requeued = 0usize;
        for state in [IndexState::Pending, IndexState::ThumbnailReady, IndexState::EmbeddingInFlight] {
            let records = self.registry.list_by_state(state, usize::MAX).await?;
            for record in records {
                if self.sender.try_send(record.gmid.clone()).is_ok() {
                    requeued += 1;
                }
            }
        }

        let indexed = self.registry.list_by_state(IndexState::Indexed, usize::MAX).await?;
        for record in indexed {
            let missing = match self.index.get(&record.gmid).await {
                Ok(vectors) => vectors.is_none(),
                Err(e) => {
                    warn!(
                        gmid = %record.gmid,
                        error = %e,
                        "failed to check vector index during reconciliation, leaving indexed record alone"
                    );
                    continue;
                }
            };
            if !missing {
                continue;
            }
            match self
                .registry
                .transition(&record.gmid, IndexState::Indexed, IndexState::ThumbnailReady, None)
                .await
            {
                Ok(true) => {
                    if self.sender.try_send(record.gmid.clone()).is_ok() {
                        requeued += 1;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(gmid = %record.gmid, error = %e, "failed to demote an indexed record missing from the vector index");
                }
            }
        }
        Ok(requeued)
    }
}

async fn process_item<C, R, E, V>(
    content: &C,
    registry: &R,
    embeddings: &E,
    index: &V,
    gmid: &Gmid,
    max_attempts: u32
) -> Result<(), String>
where
    C: ContentStore,
    C::Error: std::fmt::Display,
    R: MetadataRegistry,
    R::Error: std::fmt::Display,
    E: EmbeddingProvider,
    E::Error: std::fmt::Display,
    V: VectorIndex,
    V::Error: std::fmt::Display
{
    let record = registry
        .get(gmid)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "record vanished mid-pipeline".to_string())?;

    if record.index_state != IndexState::ThumbnailReady {
        return Ok(());
    }

    let moved = registry
        .transition(gmid, IndexState::ThumbnailReady, IndexState::EmbeddingInFlight, None)
        .await
        .map_err(|e| e.to_string())?;
    if !moved {
        return Ok(()); // lost the CAS race to another worker
    }

    let thumbnail_bytes = match content.read(Path::new(&record.thumbnail_path)).await {
        Ok(bytes) => bytes,
        Err(e) => return retry_or_fail(registry, gmid, record.index_attempts, max_attempts, e.to_string()).await
    };

    let (text_result, image_result) =
        tokio::join!(embeddings.embed_text(&record.description), embeddings.embed_image(&thumbnail_bytes));

    match (text_result, image_result) {
        (Ok(text_vec), Ok(image_vec)) => {
            let payload = record.to_payload();
            match index.upsert(gmid, Some(text_vec), Some(image_vec), &payload).await {
                Ok(()) => {
                    registry
                        .transition(gmid, IndexState::EmbeddingInFlight, IndexState::Indexed, None)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(())
                }
                Err(e) => retry_or_fail(registry, gmid, record.index_attempts, max_attempts, e.to_string()).await
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            retry_or_fail(registry, gmid, record.index_attempts, max_attempts, e.to_string()).await
        }
    }
}

/// Re-embedding on description edit follows the same `thumbnail_ready`
/// entry point: the caller CASes `indexed → thumbnail_ready` and enqueues,
/// so `process_item` re-derives both vectors from the still-valid
/// thumbnail rather than needing a separate code path (§4.5).
async fn retry_or_fail<R>(
    registry: &R,
    gmid: &Gmid,
    current_attempts: u32,
    max_attempts: u32,
    reason: String
) -> Result<(), String>
where
    R: MetadataRegistry,
    R::Error: std::fmt::Display
{
    if current_attempts + 1 >= max_attempts {
        registry
            .transition(gmid, IndexState::EmbeddingInFlight, IndexState::Failed, Some(reason))
            .await
            .map_err(|e| e.to_string())?;
    } else {
        registry
            .transition(gmid, IndexState::EmbeddingInFlight, IndexState::ThumbnailReady, Some(reason))
            .await
            .map_err(|e| e.to_string())?;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use mk_core::{Gmid as GmidType, MediaRecord, MediaType};
    use std::sync::Mutex as StdMutex;

    struct InMemoryRegistry {
        records: StdMutex<std::collections::HashMap<String, MediaRecord>>
    }

    impl InMemoryRegistry {
        fn new() -> Self {
            Self { records: StdMutex::new(std::collections::HashMap::new()) }
        }

        fn seed(&self, record: MediaRecord) {
            self.records.lock().unwrap().insert(record.gmid.to_string(), record);
        }
    }

    #[async_trait::async_trait]
    impl MetadataRegistry for InMemoryRegistry {
        type Error = String;

        async fn put(&self, record: MediaRecord) -> Result<(), Self::Error> {
            self.records.lock().unwrap().insert(record.gmid.to_string(), record);
            Ok(())
        }

        async fn get(&self, gmid: &GmidType) -> Result<Option<MediaRecord>, Self::Error> {
            Ok(self.records.lock().unwrap().get(gmid.as_str()).cloned())
        }

        async fn find_by_path(&self, stored_path: &str) -> Result<Option<MediaRecord>, Self::Error> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .find(|r| r.stored_path == stored_path)
                .cloned())
        }

        async fn list(
            &self,
            _limit: usize,
            _cursor: Option<String>,
            media_type: Option<MediaType>
        ) -> Result<(Vec<MediaRecord>, Option<String>), Self::Error> {
            let records = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| media_type.map_or(true, |wanted| r.media_type == wanted))
                .cloned()
                .collect();
            Ok((records, None))
        }

        async fn update_description(&self, gmid: &GmidType, description: String) -> Result<(), Self::Error> {
            let mut guard = self.records.lock().unwrap();
            let record = guard.get_mut(gmid.as_str()).ok_or("missing")?;
            record.description = description;
            Ok(())
        }

        async fn transition(
            &self,
            gmid: &GmidType,
            from: IndexState,
            to: IndexState,
            error: Option<String>
        ) -> Result<bool, Self::Error> {
            let mut guard = self.records.lock().unwrap();
            let record = guard.get_mut(gmid.as_str()).ok_or("missing")?;
            if record.index_state != from {
                return Ok(false);
            }
            record.index_state = to;
            record.last_error = error;
            if to == IndexState::ThumbnailReady && from == IndexState::EmbeddingInFlight {
                record.index_attempts += 1;
            }
            Ok(true)
        }

        async fn list_by_state(&self, state: IndexState, _limit: usize) -> Result<Vec<MediaRecord>, Self::Error> {
            Ok(self.records.lock().unwrap().values().filter(|r| r.index_state == state).cloned().collect())
        }

        async fn delete(&self, gmid: &GmidType) -> Result<(), Self::Error> {
            self.records.lock().unwrap().remove(gmid.as_str());
            Ok(())
        }
    }

    struct NullVectorIndex;

    #[async_trait::async_trait]
    impl VectorIndex for NullVectorIndex {
        type Error = String;

        async fn ensure_collection(&self, _dimension: usize) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn upsert(
            &self,
            _gmid: &GmidType,
            _text_vector: Option<Vec<f32>>,
            _image_vector: Option<Vec<f32>>,
            _payload: &mk_core::VectorPayload
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn search(
            &self,
            _vector_name: NamedVector,
            _query_vector: &[f32],
            _limit: usize,
            _score_threshold: Option<f32>
        ) -> Result<Vec<mk_core::SearchHit>, Self::Error> {
            Ok(vec![])
        }

        async fn delete(&self, _gmid: &GmidType) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn stats(&self) -> Result<mk_core::traits::CollectionStats, Self::Error> {
            Ok(mk_core::traits::CollectionStats { point_count: 0, dimension: 8 })
        }

        async fn get(&self, _gmid: &GmidType) -> Result<Option<mk_core::StoredVectors>, Self::Error> {
            Ok(None)
        }
    }

    struct StubContentStore;

    #[async_trait::async_trait]
    impl ContentStore for StubContentStore {
        type Error = String;

        async fn store_original(
            &self,
            _gmid: &GmidType,
            _media_type: MediaType,
            _original_name: &str,
            _bytes: &[u8]
        ) -> Result<std::path::PathBuf, Self::Error> {
            Ok(std::path::PathBuf::new())
        }

        async fn store_thumbnail(&self, _gmid: &GmidType, _bytes: &[u8]) -> Result<std::path::PathBuf, Self::Error> {
            Ok(std::path::PathBuf::new())
        }

        async fn read(&self, _relative_path: &Path) -> Result<Vec<u8>, Self::Error> {
            Ok(b"fake thumbnail bytes".to_vec())
        }

        async fn delete(&self, _original_path: &Path, _thumbnail_path: &Path) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn sample_record(gmid: GmidType, state: IndexState) -> MediaRecord {
        MediaRecord {
            gmid,
            original_name: "dinner.jpg".to_string(),
            stored_path: "photos/2026-01-01/dinner.jpg".to_string(),
            thumbnail_path: "thumbnails/2026-01-01/x.jpg".to_string(),
            media_type: MediaType::Photo,
            size_bytes: 1000,
            width: Some(100),
            height: Some(100),
            duration_ms: None,
            upload_time: chrono::Utc::now(),
            description: "family dinner 2023".to_string(),
            index_state: state,
            index_attempts: 0,
            last_error: None
        }
    }

    #[tokio::test]
    async fn thumbnail_ready_record_reaches_indexed() {
        let gmid = Gmid::from_content(b"pipeline happy path");
        let registry = InMemoryRegistry::new();
        registry.seed(sample_record(gmid.clone(), IndexState::ThumbnailReady));

        let embeddings = MockEmbeddingProvider::new(8);
        let index = NullVectorIndex;
        let content = StubContentStore;

        process_item(&content, &registry, &embeddings, &index, &gmid, 5).await.unwrap();

        let record = registry.get(&gmid).await.unwrap().unwrap();
        assert_eq!(record.index_state, IndexState::Indexed);
    }

    #[tokio::test]
    async fn pending_record_is_left_untouched_by_process_item() {
        let gmid = Gmid::from_content(b"pending item");
        let registry = InMemoryRegistry::new();
        registry.seed(sample_record(gmid.clone(), IndexState::Pending));

        let embeddings = MockEmbeddingProvider::new(8);
        let index = NullVectorIndex;
        let content = StubContentStore;

        process_item(&content, &registry, &embeddings, &index, &gmid, 5).await.unwrap();

        let record = registry.get(&gmid).await.unwrap().unwrap();
        assert_eq!(record.index_state, IndexState::Pending);
    }

    #[tokio::test]
    async fn concurrent_workers_do_not_double_process_same_gmid() {
        let gmid = Gmid::from_content(b"race test");
        let registry = Arc::new(InMemoryRegistry::new());
        registry.seed(sample_record(gmid.clone(), IndexState::ThumbnailReady));
        let embeddings = Arc::new(MockEmbeddingProvider::new(8));
        let index = Arc::new(NullVectorIndex);
        let content = Arc::new(StubContentStore);

        let (a, b) = tokio::join!(
            process_item(&*content, &*registry, &*embeddings, &*index, &gmid, 5),
            process_item(&*content, &*registry, &*embeddings, &*index, &gmid, 5)
        );
        a.unwrap();
        b.unwrap();

        let record = registry.get(&gmid).await.unwrap().unwrap();
        assert_eq!(record.index_state, IndexState::Indexed);
    }
}
