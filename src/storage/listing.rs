// Lists saved recordings for the library view.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct RecordingEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// Scans the recordings directory, newest first.
///
/// Listing is best-effort: a missing or unreadable directory yields an empty
/// list with a log line, and unreadable entries are skipped. Only files with
/// the recorder's output extension are included, so `.part` files and stray
/// downloads never show up.
pub struct RecordingsLister {
    dir: PathBuf,
    extension: String,
}

impl RecordingsLister {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn list(&self) -> Vec<RecordingEntry> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(read_dir) => read_dir,
            Err(e) => {
                debug!("recordings directory {} unavailable: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("failed reading {}: {}", self.dir.display(), e);
                    break;
                }
            };

            let path = entry.path();
            let matches_ext = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(self.extension.as_str()))
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    debug!("skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let name = entry.file_name().to_string_lossy().into_owned();

            entries.push(RecordingEntry {
                name,
                path,
                size: metadata.len(),
                modified_at,
            });
        }

        // Names embed the start timestamp, which breaks ties on coarse mtimes
        entries.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_directory_yields_empty_list() {
        let root = tempfile::tempdir().unwrap();
        let lister = RecordingsLister::new(root.path().join("nope"), "webm");
        assert!(lister.list().await.is_empty());
    }

    #[tokio::test]
    async fn lists_only_matching_extension_newest_first() {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::write(root.path().join("recording-20260101-101010.webm"), b"a")
            .await
            .unwrap();
        tokio::fs::write(root.path().join("recording-20260101-111111.webm"), b"bb")
            .await
            .unwrap();
        tokio::fs::write(root.path().join("notes.txt"), b"x").await.unwrap();
        tokio::fs::write(root.path().join(".recording.webm.part"), b"x")
            .await
            .unwrap();

        let entries = RecordingsLister::new(root.path(), "webm").list().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "recording-20260101-111111.webm");
        assert_eq!(entries[1].name, "recording-20260101-101010.webm");
        assert_eq!(entries[1].size, 1);
    }
}
