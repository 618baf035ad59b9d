//! Qdrant-backed vector index (C4, §4.4).
//!
//! One collection, two named vectors per point (`text_embedding`,
//! `image_embedding`), cosine distance, payload carrying the media's
//! non-vector metadata.

use async_trait::async_trait;
use errors::VectorIndexError;
use mk_core::traits::{CollectionStats, VectorIndex};
use mk_core::{Gmid, NamedVector, SearchHit, VectorPayload};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, NamedVectors, PointId, PointStruct,
    ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParams,
    VectorParamsMap, VectorsConfig,
    vectors_config::Config
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::sync::Arc;

pub struct QdrantVectorIndex {
    client: Arc<Qdrant>,
    collection_name: String,
    fix_dimension_on_mismatch: bool
}

impl QdrantVectorIndex {
    pub fn connect(url: &str, collection_name: String, fix_dimension_on_mismatch: bool) -> Result<Self, VectorIndexError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorIndexError::Unavailable { reason: e.to_string() })?;
        Ok(Self { client: Arc::new(client), collection_name, fix_dimension_on_mismatch })
    }

    fn json_to_qdrant_value(value: &serde_json::Value) -> QdrantValue {
        match value {
            serde_json::Value::String(s) => s.clone().into(),
            serde_json::Value::Number(n) if n.is_i64() => n.as_i64().unwrap().into(),
            serde_json::Value::Number(n) => n.as_f64().unwrap_or_default().into(),
            serde_json::Value::Bool(b) => (*b).into(),
            other => other.to_string().into()
        }
    }

    fn payload_map(payload: &VectorPayload) -> HashMap<String, QdrantValue> {
        payload.to_json_map().iter().map(|(k, v)| (k.clone(), Self::json_to_qdrant_value(v))).collect()
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    type Error = VectorIndexError;

    async fn ensure_collection(&self, dimension: usize) -> Result<(), Self::Error> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| VectorIndexError::Unavailable { reason: e.to_string() })?;

        let existing = collections.collections.iter().find(|c| c.name == self.collection_name);

        if let Some(_existing) = existing {
            let info = self
                .client
                .collection_info(&self.collection_name)
                .await
                .map_err(|e| VectorIndexError::Query { reason: e.to_string() })?;
            let existing_dim = info
                .result
                .as_ref()
                .and_then(|r| r.config.as_ref())
                .and_then(|c| c.params.as_ref())
                .and_then(|p| p.vectors_config.as_ref())
                .and_then(|vc| vc.config.as_ref())
                .and_then(|cfg| match cfg {
                    Config::ParamsMap(map) => map.map.get("text_embedding").map(|v| v.size as usize),
                    Config::Params(p) => Some(p.size as usize)
                });

            if let Some(existing_dim) = existing_dim {
                if existing_dim != dimension {
                    if !self.fix_dimension_on_mismatch {
                        return Err(VectorIndexError::DimensionMismatch {
                            existing: existing_dim,
                            requested: dimension
                        });
                    }
                    self.client
                        .delete_collection(&self.collection_name)
                        .await
                        .map_err(|e| VectorIndexError::Unavailable { reason: e.to_string() })?;
                    self.create_collection(dimension).await?;
                }
            }
            return Ok(());
        }

        self.create_collection(dimension).await
    }

    async fn upsert(
        &self,
        gmid: &Gmid,
        text_vector: Option<Vec<f32>>,
        image_vector: Option<Vec<f32>>,
        payload: &VectorPayload
    ) -> Result<(), Self::Error> {
        let mut vectors = NamedVectors::default();
        if let Some(v) = text_vector {
            vectors = vectors.add_vector(NamedVector::TextEmbedding.as_str(), v);
        }
        if let Some(v) = image_vector {
            vectors = vectors.add_vector(NamedVector::ImageEmbedding.as_str(), v);
        }

        let point = PointStruct {
            id: Some(PointId::from(gmid.to_string())),
            vectors: Some(vectors.into()),
            payload: Self::payload_map(payload)
        };

        let request = UpsertPointsBuilder::new(&self.collection_name, vec![point]);
        self.client
            .upsert_points(request)
            .await
            .map_err(|e| VectorIndexError::Query { reason: format!("upsert failed: {e}") })?;
        Ok(())
    }

    async fn search(
        &self,
        vector_name: NamedVector,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>
    ) -> Result<Vec<SearchHit>, Self::Error> {
        let mut request =
            SearchPointsBuilder::new(&self.collection_name, query_vector.to_vec(), limit as u64)
                .vector_name(vector_name.as_str())
                .with_payload(true);

        if let Some(threshold) = score_threshold {
            request = request.score_threshold(threshold);
        }

        let result = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorIndexError::Query { reason: format!("search failed: {e}") })?;

        result.result.into_iter().map(Self::point_to_hit).collect()
    }

    async fn delete(&self, gmid: &Gmid) -> Result<(), Self::Error> {
        use qdrant_client::qdrant::DeletePointsBuilder;
        let point_id = PointId::from(gmid.to_string());
        let request = DeletePointsBuilder::new(&self.collection_name).points(vec![point_id]);
        self.client
            .delete_points(request)
            .await
            .map_err(|e| VectorIndexError::Query { reason: format!("delete failed: {e}") })?;
        Ok(())
    }

    async fn get(&self, gmid: &Gmid) -> Result<Option<mk_core::StoredVectors>, Self::Error> {
        use qdrant_client::qdrant::GetPointsBuilder;
        let request = GetPointsBuilder::new(&self.collection_name, vec![PointId::from(gmid.to_string())])
            .with_vectors(true);
        let result = self
            .client
            .get_points(request)
            .await
            .map_err(|e| VectorIndexError::Query { reason: format!("get failed: {e}") })?;

        let Some(point) = result.result.into_iter().next() else { return Ok(None) };
        let named = point.vectors.and_then(|v| match v.vectors_options {
            Some(qdrant_client::qdrant::vectors_output::VectorsOptions::Vectors(named)) => Some(named),
            _ => None
        });

        let extract = |name: &str| -> Option<Vec<f32>> {
            named.as_ref()?.vectors.get(name).and_then(|v| match &v.vector {
                Some(qdrant_client::qdrant::vector_output::Vector::Dense(dense)) => Some(dense.data.clone()),
                _ => None
            })
        };

        Ok(Some(mk_core::StoredVectors {
            text_embedding: extract(NamedVector::TextEmbedding.as_str()),
            image_embedding: extract(NamedVector::ImageEmbedding.as_str())
        }))
    }

    async fn stats(&self) -> Result<CollectionStats, Self::Error> {
        let info = self
            .client
            .collection_info(&self.collection_name)
            .await
            .map_err(|e| VectorIndexError::Query { reason: e.to_string() })?;
        let result = info.result.ok_or_else(|| VectorIndexError::Unavailable {
            reason: "collection info missing".to_string()
        })?;
        let point_count = result.points_count.unwrap_or(0);
        let dimension = result
            .config
            .as_ref()
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|vc| vc.config.as_ref())
            .and_then(|cfg| match cfg {
                Config::ParamsMap(map) => map.map.get("text_embedding").map(|v| v.size as usize),
                Config::Params(p) => Some(p.size as usize)
            })
            .unwrap_or(0);
        Ok(CollectionStats { point_count, dimension })
    }
}

impl QdrantVectorIndex {
    async fn create_collection(&self, dimension: usize) -> Result<(), VectorIndexError> {
        let vector_params = VectorParams { size: dimension as u64, distance: Distance::Cosine.into(), ..Default::default() };
        let mut map = HashMap::new();
        map.insert(NamedVector::TextEmbedding.as_str().to_string(), vector_params.clone());
        map.insert(NamedVector::ImageEmbedding.as_str().to_string(), vector_params);

        let request = CreateCollectionBuilder::new(&self.collection_name)
            .vectors_config(VectorsConfig { config: Some(Config::ParamsMap(VectorParamsMap { map })) });

        self.client
            .create_collection(request)
            .await
            .map_err(|e| VectorIndexError::Unavailable { reason: format!("create collection failed: {e}") })?;
        Ok(())
    }

    fn point_to_hit(point: ScoredPoint) -> Result<SearchHit, VectorIndexError> {
        let gmid_str = match point.id.and_then(|id| id.point_id_options) {
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
            None => return Err(VectorIndexError::Query { reason: "point missing id".to_string() })
        };
        let gmid: Gmid = gmid_str
            .parse()
            .map_err(|_| VectorIndexError::Query { reason: format!("malformed point id: {gmid_str}") })?;

        let payload_json: HashMap<String, serde_json::Value> =
            point.payload.into_iter().map(|(k, v)| (k, v.into())).collect();
        let payload = VectorPayload::from_json_map(&payload_json)
            .map_err(|e| VectorIndexError::Query { reason: e.to_string() })?;

        Ok(SearchHit { gmid, score: point.score, payload })
    }

    /// Used by `Condition::matches` style filtered search when a caller
    /// needs to narrow by payload field; not yet exercised by C6 (§9).
    #[allow(dead_code)]
    fn filter_eq(field: &str, value: &str) -> Filter {
        Filter::all(vec![Condition::matches(field, value.to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connects_without_network_call() {
        let index = QdrantVectorIndex::connect("http://localhost:6334", "media_embeddings".to_string(), false);
        assert!(index.is_ok());
    }

    #[test]
    fn payload_map_round_trips_media_fields() {
        let payload = VectorPayload {
            schema_version: mk_core::PAYLOAD_SCHEMA_VERSION,
            gmid: Gmid::from_content(b"qdrant test"),
            original_name: "sunset.jpg".to_string(),
            stored_path: "photos/2026-01-01/sunset_1.jpg".to_string(),
            thumbnail_path: "thumbnails/2026-01-01/abc.jpg".to_string(),
            media_type: mk_core::MediaType::Photo,
            size_bytes: 12345,
            width: Some(1920),
            height: Some(1080),
            duration_ms: None,
            upload_time: chrono::Utc::now(),
            description: "a sunset".to_string()
        };
        let map = QdrantVectorIndex::payload_map(&payload);
        assert!(map.contains_key("original_name"));
        assert!(map.contains_key("description"));
    }
}
