// Writes finished recordings to disk.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// A recording that reached disk.
#[derive(Debug, Clone, Serialize)]
pub struct SavedRecording {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not prepare recordings directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for finished recording blobs.
#[async_trait::async_trait]
pub trait FileSink: Send + Sync {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<SavedRecording, StorageError>;

    /// Directory saved recordings land in.
    fn dir(&self) -> &Path;
}

/// Saves into the user's videos directory.
///
/// The directory is created on first save. Writes are atomic: bytes land in
/// a `.part` file that is renamed into place, so the listing never shows a
/// half-written recording.
pub struct VideosDirSink {
    dir: PathBuf,
}

impl VideosDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform videos directory, falling back to the app data directory
    /// and finally to a relative path for stripped-down environments.
    pub fn default_dir() -> PathBuf {
        if let Some(videos) = dirs::video_dir() {
            return videos.join("deskcast");
        }
        if let Some(data) = dirs::data_dir() {
            return data.join("deskcast").join("recordings");
        }
        PathBuf::from("recordings")
    }

    /// First name that does not collide with an existing recording.
    /// Filenames are timestamped to the second, so two quick consecutive
    /// saves would otherwise land on the same path.
    async fn unique_name(&self, filename: &str) -> String {
        if !self.exists(filename).await {
            return filename.to_string();
        }

        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (filename, None),
        };
        let mut n = 2u32;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{}-{}.{}", stem, n, ext),
                None => format!("{}-{}", stem, n),
            };
            if !self.exists(&candidate).await {
                return candidate;
            }
            n += 1;
        }
    }

    async fn exists(&self, filename: &str) -> bool {
        tokio::fs::try_exists(self.dir.join(filename))
            .await
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl FileSink for VideosDirSink {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<SavedRecording, StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let filename = self.unique_name(filename).await;
        let path = self.dir.join(&filename);
        let part = self.dir.join(format!(".{}.part", filename));

        tokio::fs::write(&part, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: part.clone(),
                source,
            })?;
        tokio::fs::rename(&part, &path)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        let size = bytes.len() as u64;
        info!("saved recording {} ({} bytes)", path.display(), size);
        Ok(SavedRecording {
            name: filename,
            path,
            size,
        })
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}
