//! Date-partitioned filesystem content store (C1).
//!
//! Layout: `<root>/<photos|videos>/<YYYY-MM-DD>/<stem>_<unix_ts_ms>.<ext>`
//! for originals, `<root>/thumbnails/<YYYY-MM-DD>/<gmid>.jpg` for
//! thumbnails. Writes go to a `.tmp` sibling, get `fsync`'d, then renamed
//! into place so a concurrent reader never observes a partial file.

use async_trait::async_trait;
use chrono::Utc;
use errors::StorageError;
use mk_core::traits::ContentStore as ContentStoreTrait;
use mk_core::{Gmid, MediaType};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct FsContentStore {
    root: PathBuf
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds the relative path for an original upload, resolving
    /// intra-day collisions with a 4-hex counter on the rare millisecond
    /// tie (§4.1).
    async fn original_relative_path(
        &self,
        media_type: MediaType,
        original_name: &str
    ) -> Result<PathBuf, StorageError> {
        let now = Utc::now();
        let day = now.format("%Y-%m-%d");
        let stem = Path::new(original_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");
        let ext = Path::new(original_name)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("bin");
        let ts_ms = now.timestamp_millis();

        let dir = self.root.join(media_type.directory()).join(day.to_string());
        let mut candidate = dir.join(format!("{stem}_{ts_ms}.{ext}"));
        let mut counter: u32 = 0;
        while fs::try_exists(&candidate).await.unwrap_or(false) {
            counter += 1;
            candidate = dir.join(format!("{stem}_{ts_ms}_{counter:04x}.{ext}"));
        }

        Ok(candidate
            .strip_prefix(&self.root)
            .unwrap_or(&candidate)
            .to_path_buf())
    }

    fn thumbnail_relative_path(&self, gmid: &Gmid) -> PathBuf {
        let day = Utc::now().format("%Y-%m-%d");
        PathBuf::from("thumbnails")
            .join(day.to_string())
            .join(format!("{gmid}.jpg"))
    }

    async fn write_atomic(&self, relative: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let absolute = self.root.join(relative);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, &e))?;
        }
        let tmp_path = absolute.with_extension(format!(
            "{}.tmp",
            absolute.extension().and_then(|e| e.to_str()).unwrap_or("")
        ));

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| io_error(&tmp_path, &e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| io_error(&tmp_path, &e))?;
        file.sync_all().await.map_err(|e| io_error(&tmp_path, &e))?;
        drop(file);

        fs::rename(&tmp_path, &absolute)
            .await
            .map_err(|e| io_error(&absolute, &e))?;
        Ok(())
    }
}

fn io_error(path: &Path, e: &std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string()
    }
}

#[async_trait]
impl ContentStoreTrait for FsContentStore {
    type Error = StorageError;

    async fn store_original(
        &self,
        _gmid: &Gmid,
        media_type: MediaType,
        original_name: &str,
        bytes: &[u8]
    ) -> Result<PathBuf, Self::Error> {
        let relative = self.original_relative_path(media_type, original_name).await?;
        self.write_atomic(&relative, bytes).await?;
        Ok(relative)
    }

    async fn store_thumbnail(&self, gmid: &Gmid, bytes: &[u8]) -> Result<PathBuf, Self::Error> {
        let relative = self.thumbnail_relative_path(gmid);
        self.write_atomic(&relative, bytes).await?;
        Ok(relative)
    }

    async fn read(&self, relative_path: &Path) -> Result<Vec<u8>, Self::Error> {
        let absolute = self.root.join(relative_path);
        fs::read(&absolute).await.map_err(|e| io_error(&absolute, &e))
    }

    async fn delete(&self, original_path: &Path, thumbnail_path: &Path) -> Result<(), Self::Error> {
        for relative in [original_path, thumbnail_path] {
            let absolute = self.root.join(relative);
            if fs::try_exists(&absolute).await.unwrap_or(false) {
                fs::remove_file(&absolute).await.map_err(|e| io_error(&absolute, &e))?;
            }
        }
        Ok(())
    }
}
