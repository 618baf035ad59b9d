//! Thumbnail and preview generation (§4.1, §4.6 Mode B): an opaque image
//! utility from the spec's point of view, backed by the `image` crate.
//! Thumbnails are always JPEG regardless of the source format; decoding and
//! resizing are CPU-bound and run inside `spawn_blocking`.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

/// Long-edge cap for generated thumbnails and previews (§4.1: thumbnails
/// are "always JPEG"; the spec leaves the dimension unspecified).
const MAX_EDGE: u32 = 512;

/// JPEG quality for the re-encoded thumbnail/preview.
const JPEG_QUALITY: u8 = 85;

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to encode thumbnail: {0}")]
    Encode(String),

    #[error("thumbnailing task panicked")]
    JoinError
}

/// The dimensions of a decoded photo, for the `width`/`height` fields on
/// `MediaRecord` (§3).
pub struct Dimensions {
    pub width: u32,
    pub height: u32
}

/// Decodes `bytes`, resizes to fit within `MAX_EDGE` on the long edge
/// (no upscaling), and re-encodes as JPEG. Used both for the stored
/// thumbnail and for the in-memory image-search preview (§4.6 Mode B
/// reuses "the same pipeline as thumbnailing").
pub async fn generate_jpeg_thumbnail(bytes: Vec<u8>) -> Result<(Vec<u8>, Dimensions), ThumbnailError> {
    tokio::task::spawn_blocking(move || {
        let image = image::load_from_memory(&bytes)?;
        let (width, height) = image.dimensions();
        let resized = resize_to_fit(&image);

        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        resized.write_with_encoder(encoder).map_err(|e| ThumbnailError::Encode(e.to_string()))?;

        Ok((buf, Dimensions { width, height }))
    })
    .await
    .map_err(|_| ThumbnailError::JoinError)?
}

fn resize_to_fit(image: &DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width.max(height) <= MAX_EDGE {
        return image.clone();
    }
    if width >= height {
        image.resize(MAX_EDGE, height * MAX_EDGE / width.max(1), FilterType::Lanczos3)
    } else {
        image.resize(width * MAX_EDGE / height.max(1), MAX_EDGE, FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::new_rgb8(width, height);
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn thumbnail_is_reencoded_as_jpeg() {
        let bytes = sample_png(800, 400);
        let (thumb, dims) = generate_jpeg_thumbnail(bytes).await.unwrap();
        assert_eq!(dims.width, 800);
        assert_eq!(dims.height, 400);
        assert_eq!(image::guess_format(&thumb).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn thumbnail_is_capped_on_the_long_edge() {
        let bytes = sample_png(2000, 1000);
        let (thumb, _) = generate_jpeg_thumbnail(bytes).await.unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        let (w, h) = decoded.dimensions();
        assert_eq!(w, MAX_EDGE);
        assert_eq!(h, 256);
    }

    #[tokio::test]
    async fn small_images_are_not_upscaled() {
        let bytes = sample_png(100, 80);
        let (thumb, _) = generate_jpeg_thumbnail(bytes).await.unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        let (w, h) = decoded.dimensions();
        assert_eq!((w, h), (100, 80));
    }

    #[tokio::test]
    async fn malformed_bytes_fail_to_decode() {
        let err = generate_jpeg_thumbnail(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, ThumbnailError::Decode(_)));
    }
}
