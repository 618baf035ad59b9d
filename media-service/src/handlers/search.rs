//! `POST /search/text`, `POST /search/by-image`, `POST /search/similar-by-file`,
//! `GET /search/stats` (§6, §4.6).

use axum::extract::{Form, Multipart, State};
use axum::Json;
use errors::ApiError;
use mk_core::traits::{MetadataRegistry, VectorIndex};
use mk_core::SearchResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;
use crate::thumbnail::generate_jpeg_thumbnail;

#[derive(Debug, Deserialize)]
pub struct TextQuery {
    pub query: String,
    pub limit: Option<usize>
}

pub async fn text(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextQuery>
) -> Result<Json<SearchResponse>, ApiError> {
    let response = state
        .search
        .search_text(&request.query, request.limit)
        .await
        .map_err(|reason| ApiError::Internal { reason })?;
    Ok(Json(response))
}

/// Mode B reuses the thumbnailing pipeline to build the in-memory preview
/// the embedding provider actually sees (§4.6), instead of embedding the
/// raw upload bytes directly.
pub async fn by_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart
) -> Result<Json<SearchResponse>, ApiError> {
    let mut image_bytes = None;
    while let Some(field) =
        multipart.next_field().await.map_err(|e| ApiError::InvalidInput { reason: e.to_string() })?
    {
        if field.name() == Some("image") {
            image_bytes =
                Some(field.bytes().await.map_err(|e| ApiError::InvalidInput { reason: e.to_string() })?.to_vec());
        }
    }
    let image_bytes =
        image_bytes.ok_or_else(|| ApiError::InvalidInput { reason: "missing image field".to_string() })?;

    let (preview, _dims) = generate_jpeg_thumbnail(image_bytes)
        .await
        .map_err(|e| ApiError::InvalidInput { reason: e.to_string() })?;

    let response =
        state.search.search_by_image(&preview, None).await.map_err(|reason| ApiError::Internal { reason })?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct SimilarByFileForm {
    pub file_path: String
}

pub async fn similar_by_file(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SimilarByFileForm>
) -> Result<Json<SearchResponse>, ApiError> {
    let record = state
        .registry
        .find_by_path(&form.file_path)
        .await?
        .ok_or_else(|| ApiError::NotFound { gmid: form.file_path.clone() })?;

    let response = state
        .search
        .search_similar(&record.gmid, None)
        .await
        .map_err(|reason| ApiError::Internal { reason })?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub point_count: u64,
    pub dimension: usize
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.index.stats().await?;
    Ok(Json(StatsResponse { point_count: stats.point_count, dimension: stats.dimension }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn similar_by_file_rejects_unknown_path() {
        let (state, _dir) = test_state(|_| {}).await;
        let err = similar_by_file(
            State(Arc::new(state)),
            Form(SimilarByFileForm { file_path: "photos/2026-01-01/missing.jpg".to_string() })
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stats_surfaces_an_unreachable_index_as_a_dependency_error() {
        // `QdrantVectorIndex::connect` is lazy, so this only fails once the
        // handler actually tries to talk to the (non-running) test address.
        let (state, _dir) = test_state(|_| {}).await;
        let err = stats(State(Arc::new(state))).await.unwrap_err();
        assert!(matches!(err, ApiError::Dependency(_)));
    }
}
