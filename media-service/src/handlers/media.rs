//! `GET /media/list`, `GET /media/{gmid}`, `DELETE /media/{gmid}`,
//! `PUT /media/{gmid}/description` (§6).

use axum::extract::{Form, Path, Query, State};
use axum::Json;
use errors::ApiError;
use mk_core::traits::{ContentStore, MetadataRegistry, VectorIndex};
use mk_core::{Gmid, IndexState, MediaRecord, MediaType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub media_type: Option<String>
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub items: Vec<MediaRecord>,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool
}

/// `list`'s cursor is an opaque row offset; a page number is converted to
/// one since the HTTP contract is paged but the registry's own contract
/// (§3, C2) is cursor-based. The `media_type` filter is pushed into the
/// registry query itself rather than applied to an already-paginated page,
/// so filtering and pagination compose correctly.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>
) -> Result<Json<ListResponse>, ApiError> {
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, 100);
    let cursor = ((page - 1) * page_size).to_string();

    let media_type = query
        .media_type
        .as_deref()
        .map(str::parse::<MediaType>)
        .transpose()
        .map_err(|reason| ApiError::InvalidInput { reason })?;

    let (items, next_cursor) = state.registry.list(page_size, Some(cursor), media_type).await?;

    Ok(Json(ListResponse { items, page, page_size, has_more: next_cursor.is_some() }))
}

pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(gmid): Path<String>
) -> Result<Json<MediaRecord>, ApiError> {
    let gmid = parse_gmid(&gmid)?;
    let record =
        state.registry.get(&gmid).await?.ok_or_else(|| ApiError::NotFound { gmid: gmid.to_string() })?;
    Ok(Json(record))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool
}

/// Cascades across all three backends (§8 invariant 5): registry row,
/// original + thumbnail files, and the vector point. Order matters only in
/// that the registry row is removed last, so a crash mid-delete leaves a
/// record an operator can still find and retry against, rather than an
/// orphaned file with no trace of it.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(gmid): Path<String>
) -> Result<Json<DeleteResponse>, ApiError> {
    let gmid = parse_gmid(&gmid)?;
    let record =
        state.registry.get(&gmid).await?.ok_or_else(|| ApiError::NotFound { gmid: gmid.to_string() })?;

    state.content.delete(&PathBuf::from(&record.stored_path), &PathBuf::from(&record.thumbnail_path)).await?;
    state.index.delete(&gmid).await?;
    state.registry.delete(&gmid).await?;

    Ok(Json(DeleteResponse { success: true }))
}

#[derive(Debug, Deserialize)]
pub struct DescriptionForm {
    pub description: String
}

/// Editing the description invalidates both stored vectors (the text
/// embedding is derived from it, and re-upsert always writes both named
/// vectors together, §4.2) — so this CASes `Indexed -> thumbnail_ready` and
/// re-enqueues rather than patching the vector payload in place.
pub async fn update_description(
    State(state): State<Arc<AppState>>,
    Path(gmid): Path<String>,
    Form(form): Form<DescriptionForm>
) -> Result<Json<MediaRecord>, ApiError> {
    let gmid = parse_gmid(&gmid)?;
    let record =
        state.registry.get(&gmid).await?.ok_or_else(|| ApiError::NotFound { gmid: gmid.to_string() })?;

    state.registry.update_description(&gmid, form.description).await?;

    if record.index_state.can_transition_to(IndexState::ThumbnailReady) {
        state.registry.transition(&gmid, record.index_state, IndexState::ThumbnailReady, None).await?;
        if state.pipeline.enqueue(gmid.clone()).is_err() {
            tracing::warn!(%gmid, "ingestion queue full, description re-index will be picked up on reconciliation");
        }
    }

    let updated =
        state.registry.get(&gmid).await?.ok_or_else(|| ApiError::NotFound { gmid: gmid.to_string() })?;
    Ok(Json(updated))
}

fn parse_gmid(raw: &str) -> Result<Gmid, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidInput { reason: format!("malformed gmid: {raw}") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use chrono::Utc;

    fn sample(gmid: Gmid, state: IndexState) -> MediaRecord {
        MediaRecord {
            gmid,
            original_name: "cat.jpg".into(),
            stored_path: "photos/2026-07-27/cat.jpg".into(),
            thumbnail_path: "thumbnails/2026-07-27/cat.jpg".into(),
            media_type: MediaType::Photo,
            size_bytes: 10,
            width: Some(10),
            height: Some(10),
            duration_ms: None,
            upload_time: Utc::now(),
            description: "cat".into(),
            index_state: state,
            index_attempts: 0,
            last_error: None
        }
    }

    #[tokio::test]
    async fn detail_returns_not_found_for_unknown_gmid() {
        let (state, _dir) = test_state(|_| {}).await;
        let gmid = "a".repeat(32);
        let err = detail(State(Arc::new(state)), Path(gmid)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_media_type() {
        let (state, _dir) = test_state(|_| {}).await;
        let photo = Gmid::from_content(b"photo record");
        state.registry.put(sample(photo.clone(), IndexState::Indexed)).await.unwrap();
        let mut video = sample(Gmid::from_content(b"video record"), IndexState::Indexed);
        video.media_type = MediaType::Video;
        state.registry.put(video).await.unwrap();

        let state = Arc::new(state);
        let response = list(
            State(state.clone()),
            Query(ListQuery { page: 1, page_size: 20, media_type: Some("photo".to_string()) })
        )
        .await
        .unwrap();
        assert_eq!(response.0.items.len(), 1);
        assert_eq!(response.0.items[0].gmid, photo);
    }

    #[tokio::test]
    async fn update_description_requeues_an_indexed_record() {
        let (state, _dir) = test_state(|_| {}).await;
        let gmid = Gmid::from_content(b"requeue me");
        state.registry.put(sample(gmid.clone(), IndexState::Indexed)).await.unwrap();

        let state = Arc::new(state);
        let updated = update_description(
            State(state.clone()),
            Path(gmid.to_string()),
            Form(DescriptionForm { description: "a new caption".to_string() })
        )
        .await
        .unwrap();

        assert_eq!(updated.0.description, "a new caption");
        assert_eq!(updated.0.index_state, IndexState::ThumbnailReady);
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let (state, _dir) = test_state(|_| {}).await;
        let gmid = Gmid::from_content(b"delete me");
        state.registry.put(sample(gmid.clone(), IndexState::Pending)).await.unwrap();

        let state = Arc::new(state);
        delete(State(state.clone()), Path(gmid.to_string())).await.unwrap();
        assert!(state.registry.get(&gmid).await.unwrap().is_none());
    }
}
