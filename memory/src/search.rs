//! Search engine (C6, §4.6): the three query modes over the vector index.
//! Thresholds are server-enforced — callers cannot override them, so result
//! quality stays consistent regardless of client input.

use config::SearchConfig;
use mk_core::traits::{EmbeddingProvider, VectorIndex};
use mk_core::{Gmid, NamedVector, SearchHit, SearchResponse};
use std::collections::HashMap;
use std::time::Instant;

pub struct SearchEngine<E, V> {
    embeddings: E,
    index: V,
    config: SearchConfig
}

impl<E, V> SearchEngine<E, V>
where
    E: EmbeddingProvider,
    E::Error: std::fmt::Display,
    V: VectorIndex,
    V::Error: std::fmt::Display
{
    pub fn new(embeddings: E, index: V, config: SearchConfig) -> Self {
        Self { embeddings, index, config }
    }

    fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.config.default_limit).clamp(1, 100)
    }

    /// Mode A (§4.6): text → content. Runs a text-to-text and a
    /// text-to-image search in parallel, merges by GMID taking the max
    /// score on overlap.
    pub async fn search_text(&self, query: &str, limit: Option<usize>) -> Result<SearchResponse, String> {
        let start = Instant::now();
        let limit = self.clamp_limit(limit);

        let q = self.embeddings.embed_text(query).await.map_err(|e| e.to_string())?;

        let (tt, ti) = tokio::join!(
            self.index.search(NamedVector::TextEmbedding, &q, limit, Some(self.config.text_to_text_threshold)),
            self.index.search(NamedVector::ImageEmbedding, &q, limit, Some(self.config.text_to_image_threshold))
        );
        let tt = tt.map_err(|e| e.to_string())?;
        let ti = ti.map_err(|e| e.to_string())?;

        let mut merged: HashMap<Gmid, SearchHit> = HashMap::new();
        for hit in tt.into_iter().chain(ti) {
            merged
                .entry(hit.gmid.clone())
                .and_modify(|existing| {
                    if hit.score > existing.score {
                        *existing = hit.clone();
                    }
                })
                .or_insert(hit);
        }

        let mut results: Vec<SearchHit> = merged.into_values().collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        Ok(SearchResponse {
            success: true,
            query: query.to_string(),
            total: results.len(),
            results,
            took_seconds: start.elapsed().as_secs_f64(),
            threshold_used: self.config.text_to_text_threshold
        })
    }

    /// Mode B (§4.6): image → content. `preview_bytes` is the already
    /// generated in-memory JPEG preview of the query image.
    pub async fn search_by_image(&self, preview_bytes: &[u8], limit: Option<usize>) -> Result<SearchResponse, String> {
        let start = Instant::now();
        let limit = self.clamp_limit(limit);

        let q = self.embeddings.embed_image(preview_bytes).await.map_err(|e| e.to_string())?;
        let results = self
            .index
            .search(NamedVector::ImageEmbedding, &q, limit, Some(self.config.image_search_threshold))
            .await
            .map_err(|e| e.to_string())?;

        Ok(SearchResponse {
            success: true,
            query: "<image>".to_string(),
            total: results.len(),
            results,
            took_seconds: start.elapsed().as_secs_f64(),
            threshold_used: self.config.image_search_threshold
        })
    }

    /// Mode C (§4.6): content → similar. Reads the existing point's image
    /// vector from the index rather than re-embedding, then strips the
    /// self-match (score ≈ 1.0, always the top hit since it's the query).
    pub async fn search_similar(&self, gmid: &Gmid, limit: Option<usize>) -> Result<SearchResponse, String> {
        let start = Instant::now();
        let limit = self.clamp_limit(limit);

        let stored = self.index.get(gmid).await.map_err(|e| e.to_string())?;
        let query_vector = stored.and_then(|v| v.image_embedding);
        let Some(query_vector) = query_vector else {
            return Ok(SearchResponse {
                success: false,
                query: gmid.to_string(),
                results: vec![],
                total: 0,
                took_seconds: start.elapsed().as_secs_f64(),
                threshold_used: self.config.image_search_threshold
            });
        };

        let raw = self
            .index
            .search(NamedVector::ImageEmbedding, &query_vector, limit + 1, Some(self.config.image_search_threshold))
            .await
            .map_err(|e| e.to_string())?;

        let results: Vec<SearchHit> = raw.into_iter().filter(|hit| &hit.gmid != gmid).take(limit).collect();

        Ok(SearchResponse {
            success: true,
            query: gmid.to_string(),
            total: results.len(),
            results,
            took_seconds: start.elapsed().as_secs_f64(),
            threshold_used: self.config.image_search_threshold
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use async_trait::async_trait;
    use mk_core::traits::CollectionStats;
    use mk_core::{MediaType, VectorPayload};
    use std::sync::Mutex;

    struct FakeIndex {
        text_hits: Vec<SearchHit>,
        image_hits: Vec<SearchHit>,
        point_count: Mutex<u64>
    }

    fn hit(gmid: &str, score: f32) -> SearchHit {
        SearchHit {
            gmid: gmid.parse().unwrap(),
            score,
            payload: VectorPayload {
                schema_version: mk_core::PAYLOAD_SCHEMA_VERSION,
                gmid: gmid.parse().unwrap(),
                original_name: "x.jpg".to_string(),
                stored_path: "photos/x.jpg".to_string(),
                thumbnail_path: "thumbnails/x.jpg".to_string(),
                media_type: MediaType::Photo,
                size_bytes: 1,
                width: None,
                height: None,
                duration_ms: None,
                upload_time: chrono::Utc::now(),
                description: "family dinner 2023".to_string()
            }
        }
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        type Error = String;

        async fn ensure_collection(&self, _dimension: usize) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn upsert(
            &self,
            _gmid: &Gmid,
            _text_vector: Option<Vec<f32>>,
            _image_vector: Option<Vec<f32>>,
            _payload: &VectorPayload
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn search(
            &self,
            vector_name: NamedVector,
            _query_vector: &[f32],
            limit: usize,
            _score_threshold: Option<f32>
        ) -> Result<Vec<SearchHit>, Self::Error> {
            if limit == 0 {
                return Ok(vec![]);
            }
            let source = match vector_name {
                NamedVector::TextEmbedding => self.text_hits.clone(),
                NamedVector::ImageEmbedding => self.image_hits.clone()
            };
            Ok(source.into_iter().take(limit).collect())
        }

        async fn delete(&self, _gmid: &Gmid) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn stats(&self) -> Result<CollectionStats, Self::Error> {
            Ok(CollectionStats { point_count: *self.point_count.lock().unwrap(), dimension: 8 })
        }

        async fn get(&self, gmid: &Gmid) -> Result<Option<mk_core::StoredVectors>, Self::Error> {
            let found = self.image_hits.iter().find(|h| &h.gmid == gmid);
            Ok(found.map(|_| mk_core::StoredVectors {
                text_embedding: None,
                image_embedding: Some(vec![1.0; 8])
            }))
        }
    }

    fn config() -> SearchConfig {
        SearchConfig {
            text_to_text_threshold: 0.8,
            text_to_image_threshold: 0.2,
            image_search_threshold: 0.5,
            default_limit: 20
        }
    }

    #[tokio::test]
    async fn text_search_merges_and_takes_max_on_overlap() {
        let index = FakeIndex {
            text_hits: vec![hit("a".repeat(32).as_str(), 0.9)],
            image_hits: vec![hit("a".repeat(32).as_str(), 0.95), hit("b".repeat(32).as_str(), 0.3)],
            point_count: Mutex::new(2)
        };
        let engine = SearchEngine::new(MockEmbeddingProvider::new(8), index, config());

        let response = engine.search_text("family dinner 2023", None).await.unwrap();
        assert_eq!(response.total, 2);
        let top = &response.results[0];
        assert_eq!(top.gmid.to_string(), "a".repeat(32));
        assert_eq!(top.score, 0.95);
    }

    #[tokio::test]
    async fn image_search_reports_configured_threshold() {
        let index = FakeIndex {
            text_hits: vec![],
            image_hits: vec![hit("c".repeat(32).as_str(), 0.7)],
            point_count: Mutex::new(1)
        };
        let engine = SearchEngine::new(MockEmbeddingProvider::new(8), index, config());

        let response = engine.search_by_image(b"jpeg preview bytes", None).await.unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.threshold_used, 0.5);
    }

    #[tokio::test]
    async fn similar_search_excludes_the_seed_gmid() {
        let seed = "e".repeat(32);
        let other = "f".repeat(32);
        let index = FakeIndex {
            text_hits: vec![],
            image_hits: vec![hit(&seed, 1.0), hit(&other, 0.6)],
            point_count: Mutex::new(2)
        };
        let engine = SearchEngine::new(MockEmbeddingProvider::new(8), index, config());

        let gmid: Gmid = seed.parse().unwrap();
        let response = engine.search_similar(&gmid, None).await.unwrap();
        assert!(response.success);
        assert!(response.results.iter().all(|h| h.gmid.to_string() != seed));
    }

    #[tokio::test]
    async fn similar_search_on_unindexed_gmid_returns_empty_with_failure() {
        let index = FakeIndex { text_hits: vec![], image_hits: vec![], point_count: Mutex::new(0) };
        let engine = SearchEngine::new(MockEmbeddingProvider::new(8), index, config());

        let gmid: Gmid = "d".repeat(32).parse().unwrap();
        let response = engine.search_similar(&gmid, None).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.total, 0);
    }
}
