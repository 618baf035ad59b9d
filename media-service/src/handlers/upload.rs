//! `POST /media/upload` (§6): multipart upload of one or more files.
//!
//! Per spec §4.1/§4.5, the handler stores bytes, generates a thumbnail,
//! writes a `pending` registry record, CASes it to `thumbnail_ready`, and
//! enqueues it for embedding — returning as soon as the record reaches
//! `thumbnail_ready`, without waiting for indexing to complete.

use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use errors::ApiError;
use mk_core::traits::{ContentStore, MetadataRegistry};
use mk_core::{Gmid, IndexState, MediaRecord, MediaType};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::state::AppState;
use crate::thumbnail::generate_jpeg_thumbnail;

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub file_name: String,
    pub file_type: Option<String>,
    pub file_size: u64,
    pub file_path: Option<String>,
    pub message: String
}

/// One multipart field's raw content, pulled out before any async work so
/// the `Multipart` borrow of the request body doesn't outlive the loop.
struct IncomingFile {
    file_name: String,
    bytes: Vec<u8>
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart
) -> Result<Json<Vec<UploadResult>>, ApiError> {
    let mut files = Vec::new();
    let mut description = String::new();

    while let Some(field) =
        multipart.next_field().await.map_err(|e| ApiError::InvalidInput { reason: e.to_string() })?
    {
        match field.name() {
            Some("description") => {
                description = field.text().await.unwrap_or_default();
            }
            Some("files[]") | Some("files") => {
                let file_name = field.file_name().unwrap_or("upload.bin").to_string();
                let bytes =
                    field.bytes().await.map_err(|e| ApiError::InvalidInput { reason: e.to_string() })?.to_vec();
                files.push(IncomingFile { file_name, bytes });
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::InvalidInput { reason: "no files[] field present".to_string() });
    }

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        results.push(ingest_one(&state, file, &description).await);
    }
    Ok(Json(results))
}

async fn ingest_one(state: &AppState, file: IncomingFile, description: &str) -> UploadResult {
    let size_bytes = file.bytes.len() as u64;
    if size_bytes > state.config.content.max_file_size {
        return UploadResult {
            success: false,
            file_name: file.file_name,
            file_type: None,
            file_size: size_bytes,
            file_path: None,
            message: format!("file exceeds the {} byte limit", state.config.content.max_file_size)
        };
    }

    let Some(extension) = Path::new(&file.file_name).extension().and_then(|e| e.to_str()) else {
        return UploadResult {
            success: false,
            file_name: file.file_name,
            file_type: None,
            file_size: size_bytes,
            file_path: None,
            message: "file has no extension".to_string()
        };
    };
    let Some(media_type) = MediaType::from_extension(extension) else {
        return UploadResult {
            success: false,
            file_name: file.file_name,
            file_type: None,
            file_size: size_bytes,
            file_path: None,
            message: format!("unsupported media type: .{extension}")
        };
    };

    match store_and_enqueue(state, &file.file_name, media_type, file.bytes, description).await {
        Ok(stored_path) => UploadResult {
            success: true,
            file_name: file.file_name,
            file_type: Some(media_type.to_string()),
            file_size: size_bytes,
            file_path: Some(stored_path),
            message: "accepted".to_string()
        },
        Err(reason) => UploadResult {
            success: false,
            file_name: file.file_name,
            file_type: Some(media_type.to_string()),
            file_size: size_bytes,
            file_path: None,
            message: reason
        }
    }
}

async fn store_and_enqueue(
    state: &AppState,
    file_name: &str,
    media_type: MediaType,
    bytes: Vec<u8>,
    description: &str
) -> Result<String, String> {
    let gmid = Gmid::from_content(&bytes);

    let stored_path =
        state.content.store_original(&gmid, media_type, file_name, &bytes).await.map_err(|e| e.to_string())?;

    let default_description = || {
        Path::new(file_name).file_stem().and_then(|s| s.to_str()).unwrap_or(file_name).to_string()
    };
    let description = if description.is_empty() { default_description() } else { description.to_string() };

    let mut record = MediaRecord {
        gmid: gmid.clone(),
        original_name: file_name.to_string(),
        stored_path: stored_path.display().to_string(),
        thumbnail_path: String::new(),
        media_type,
        size_bytes: bytes.len() as u64,
        width: None,
        height: None,
        duration_ms: None,
        upload_time: Utc::now(),
        description,
        index_state: IndexState::Pending,
        index_attempts: 0,
        last_error: None
    };

    let thumbnail_source = match media_type {
        MediaType::Photo => bytes,
        // Video thumbnailing needs a frame decoder the `image` crate doesn't
        // provide; until one is wired in, the file is stored but the record
        // is landed straight in `failed` rather than left in a non-terminal
        // state no worker will ever pick up.
        MediaType::Video => {
            record.last_error = Some("video thumbnailing not implemented".to_string());
            record.index_state = IndexState::Failed;
            state.registry.put(record).await.map_err(|e| e.to_string())?;
            return Ok(stored_path.display().to_string());
        }
    };

    match generate_jpeg_thumbnail(thumbnail_source).await {
        Ok((thumb_bytes, dims)) => {
            record.width = Some(dims.width);
            record.height = Some(dims.height);
            let thumbnail_path =
                state.content.store_thumbnail(&gmid, &thumb_bytes).await.map_err(|e| e.to_string())?;
            record.thumbnail_path = thumbnail_path.display().to_string();
            record.index_state = IndexState::ThumbnailReady;
            state.registry.put(record).await.map_err(|e| e.to_string())?;

            if state.pipeline.enqueue(gmid).is_err() {
                tracing::warn!(file_name, "ingestion queue full, item will be picked up on reconciliation");
            }
        }
        Err(e) => {
            record.last_error = Some(e.to_string());
            record.index_state = IndexState::Failed;
            state.registry.put(record).await.map_err(|e| e.to_string())?;
        }
    }

    Ok(stored_path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn stores_a_photo_and_reaches_thumbnail_ready() {
        let (state, _dir) = test_state(|_| {}).await;
        let png = {
            let image = image::DynamicImage::new_rgb8(64, 64);
            let mut buf = std::io::Cursor::new(Vec::new());
            image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
            buf.into_inner()
        };

        let path = store_and_enqueue(&state, "beach.png", MediaType::Photo, png.clone(), "sunset at the beach")
            .await
            .unwrap();
        assert!(path.starts_with("photos"));

        let gmid = Gmid::from_content(&png);
        let record = state.registry.get(&gmid).await.unwrap().unwrap();
        assert_eq!(record.index_state, IndexState::ThumbnailReady);
        assert_eq!(record.description, "sunset at the beach");
        assert_eq!(record.width, Some(64));
    }

    #[tokio::test]
    async fn default_description_is_the_filename_stem() {
        let (state, _dir) = test_state(|_| {}).await;
        let png = {
            let image = image::DynamicImage::new_rgb8(8, 8);
            let mut buf = std::io::Cursor::new(Vec::new());
            image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
            buf.into_inner()
        };

        store_and_enqueue(&state, "family_dinner.png", MediaType::Photo, png.clone(), "").await.unwrap();
        let record = state.registry.get(&Gmid::from_content(&png)).await.unwrap().unwrap();
        assert_eq!(record.description, "family_dinner");
    }

    #[tokio::test]
    async fn malformed_image_bytes_land_in_failed() {
        let (state, _dir) = test_state(|_| {}).await;
        let bytes = b"not actually an image".to_vec();
        store_and_enqueue(&state, "broken.jpg", MediaType::Photo, bytes.clone(), "broken").await.unwrap();
        let record = state.registry.get(&Gmid::from_content(&bytes)).await.unwrap().unwrap();
        assert_eq!(record.index_state, IndexState::Failed);
        assert!(record.last_error.is_some());
    }
}
