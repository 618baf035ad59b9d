//! Trait seams for the media indexing and retrieval engine.
//!
//! Each component (C1-C4) is defined as an async trait here and implemented
//! against a concrete backend elsewhere in the workspace, so the ingestion
//! pipeline and search engine can be exercised in tests against in-memory
//! fakes instead of a filesystem, a database, or a running Qdrant.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::gmid::Gmid;
use crate::types::{IndexState, MediaRecord, MediaType, NamedVector, SearchHit, VectorPayload};

/// C1: content-addressed filesystem storage for original uploads and the
/// thumbnails derived from them.
#[async_trait]
pub trait ContentStore: Send + Sync {
    type Error;

    /// Writes `bytes` under a path derived from `gmid` and `media_type`,
    /// returning the path relative to the content root. Must be atomic:
    /// a reader never observes a partially-written file.
    async fn store_original(
        &self,
        gmid: &Gmid,
        media_type: MediaType,
        original_name: &str,
        bytes: &[u8]
    ) -> Result<PathBuf, Self::Error>;

    /// Writes a generated thumbnail for `gmid`, returning its relative path.
    async fn store_thumbnail(&self, gmid: &Gmid, bytes: &[u8]) -> Result<PathBuf, Self::Error>;

    async fn read(&self, relative_path: &std::path::Path) -> Result<Vec<u8>, Self::Error>;

    /// Removes the original and thumbnail at the given content-root-relative
    /// paths, as recorded on the `MediaRecord`. Missing files are not an
    /// error: a caller retrying a partially-completed delete must not fail.
    async fn delete(
        &self,
        original_path: &std::path::Path,
        thumbnail_path: &std::path::Path
    ) -> Result<(), Self::Error>;
}

/// C2: the metadata registry. `transition` is the sole mutation point for
/// `index_state` and must be a compare-and-set against the expected current
/// state, so two ingestion workers racing on the same GMID can't both win.
#[async_trait]
pub trait MetadataRegistry: Send + Sync {
    type Error;

    async fn put(&self, record: MediaRecord) -> Result<(), Self::Error>;

    async fn get(&self, gmid: &Gmid) -> Result<Option<MediaRecord>, Self::Error>;

    /// Looks a record up by its stored (content-root-relative) path, used to
    /// resolve a `file_path` form field back to a GMID for similar-by-file
    /// search.
    async fn find_by_path(&self, stored_path: &str) -> Result<Option<MediaRecord>, Self::Error>;

    /// Lists records newest-first, optionally restricted to one media type
    /// so pagination and filtering compose correctly on a real dataset
    /// instead of filtering a single already-paginated page client-side.
    async fn list(
        &self,
        limit: usize,
        cursor: Option<String>,
        media_type: Option<MediaType>
    ) -> Result<(Vec<MediaRecord>, Option<String>), Self::Error>;

    async fn update_description(
        &self,
        gmid: &Gmid,
        description: String
    ) -> Result<(), Self::Error>;

    /// Compare-and-set: succeeds only if the record's current state equals
    /// `from`. Returns `Ok(false)` on a lost race rather than erroring.
    async fn transition(
        &self,
        gmid: &Gmid,
        from: IndexState,
        to: IndexState,
        error: Option<String>
    ) -> Result<bool, Self::Error>;

    async fn list_by_state(&self, state: IndexState, limit: usize)
    -> Result<Vec<MediaRecord>, Self::Error>;

    async fn delete(&self, gmid: &Gmid) -> Result<(), Self::Error>;
}

/// C3: the embedding provider. Implementations own their own rate limiting,
/// retry and circuit breaking; callers just await the result.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    type Error;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, Self::Error>;

    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, Self::Error>;

    fn dimension(&self) -> usize;

    /// Cheap reachability probe used by `/health` (§6); must not rely on the
    /// text cache, so an outage is reported even after a prior successful
    /// call.
    async fn health(&self) -> Result<(), Self::Error>;
}

/// C4: the vector index. Each point carries two named vectors
/// (`text_embedding`, `image_embedding`); a query addresses one of them.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    type Error;

    /// Creates the collection if absent. If it exists with a different
    /// vector dimension, the implementation decides whether to drop and
    /// recreate it or reject the mismatch (see `fix_dimension_on_mismatch`).
    async fn ensure_collection(&self, dimension: usize) -> Result<(), Self::Error>;

    async fn upsert(
        &self,
        gmid: &Gmid,
        text_vector: Option<Vec<f32>>,
        image_vector: Option<Vec<f32>>,
        payload: &VectorPayload
    ) -> Result<(), Self::Error>;

    async fn search(
        &self,
        vector_name: NamedVector,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>
    ) -> Result<Vec<SearchHit>, Self::Error>;

    async fn delete(&self, gmid: &Gmid) -> Result<(), Self::Error>;

    async fn stats(&self) -> Result<CollectionStats, Self::Error>;

    /// Reads back a single point's named vectors directly, without a
    /// similarity search. Used by Mode C (content → similar) to retrieve
    /// the seed `image_embedding` with no re-embedding (§4.6).
    async fn get(&self, gmid: &Gmid) -> Result<Option<StoredVectors>, Self::Error>;
}

#[derive(Debug, Clone)]
pub struct StoredVectors {
    pub text_embedding: Option<Vec<f32>>,
    pub image_embedding: Option<Vec<f32>>
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CollectionStats {
    pub point_count: u64,
    pub dimension: usize
}

/// Lets a single `Arc<HttpEmbeddingProvider>` be shared between the
/// ingestion pipeline (which stores its own `Arc<E>` internally) and the
/// search engine (which takes `E` by value) without cloning the provider.
#[async_trait]
impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for std::sync::Arc<T> {
    type Error = T::Error;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, Self::Error> {
        (**self).embed_text(text).await
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, Self::Error> {
        (**self).embed_image(bytes).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    async fn health(&self) -> Result<(), Self::Error> {
        (**self).health().await
    }
}

/// Same reasoning as the `EmbeddingProvider` impl above, for the vector
/// index shared between the pipeline and the search engine.
#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for std::sync::Arc<T> {
    type Error = T::Error;

    async fn ensure_collection(&self, dimension: usize) -> Result<(), Self::Error> {
        (**self).ensure_collection(dimension).await
    }

    async fn upsert(
        &self,
        gmid: &Gmid,
        text_vector: Option<Vec<f32>>,
        image_vector: Option<Vec<f32>>,
        payload: &VectorPayload
    ) -> Result<(), Self::Error> {
        (**self).upsert(gmid, text_vector, image_vector, payload).await
    }

    async fn search(
        &self,
        vector_name: NamedVector,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>
    ) -> Result<Vec<SearchHit>, Self::Error> {
        (**self).search(vector_name, query_vector, limit, score_threshold).await
    }

    async fn delete(&self, gmid: &Gmid) -> Result<(), Self::Error> {
        (**self).delete(gmid).await
    }

    async fn stats(&self) -> Result<CollectionStats, Self::Error> {
        (**self).stats().await
    }

    async fn get(&self, gmid: &Gmid) -> Result<Option<StoredVectors>, Self::Error> {
        (**self).get(gmid).await
    }
}
