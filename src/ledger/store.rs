// On-disk persistence for the usage ledger.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Point-in-time view of recording usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub guest_count: u32,
    pub user_count: u32,
    pub is_logged_in: bool,
    pub is_subscribed: bool,
}

/// Permissive mirror of the on-disk document. Every field is optional so a
/// file written by an older build, or hand-edited, still loads: missing keys
/// merge over defaults instead of rejecting the whole document.
#[derive(Debug, Default, Deserialize)]
struct LedgerDoc {
    guest_count: Option<u32>,
    user_count: Option<u32>,
    is_logged_in: Option<bool>,
    is_subscribed: Option<bool>,
}

impl LedgerDoc {
    fn merge_over_defaults(self) -> LedgerSnapshot {
        let defaults = LedgerSnapshot::default();
        LedgerSnapshot {
            guest_count: self.guest_count.unwrap_or(defaults.guest_count),
            user_count: self.user_count.unwrap_or(defaults.user_count),
            is_logged_in: self.is_logged_in.unwrap_or(defaults.is_logged_in),
            is_subscribed: self.is_subscribed.unwrap_or(defaults.is_subscribed),
        }
    }
}

/// Reads and writes the ledger JSON document.
///
/// Loading never fails: a missing, unreadable, or corrupt file yields the
/// default snapshot with a log line. Writes go through a temp file plus
/// rename so a crash mid-write cannot leave a truncated document behind.
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> LedgerSnapshot {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no usage ledger at {}, starting fresh", self.path.display());
                return LedgerSnapshot::default();
            }
            Err(e) => {
                warn!(
                    "could not read usage ledger at {}: {}",
                    self.path.display(),
                    e
                );
                return LedgerSnapshot::default();
            }
        };

        match serde_json::from_str::<LedgerDoc>(&raw) {
            Ok(doc) => doc.merge_over_defaults(),
            Err(e) => {
                warn!(
                    "usage ledger at {} is corrupt ({}), starting fresh",
                    self.path.display(),
                    e
                );
                LedgerSnapshot::default()
            }
        }
    }

    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(snapshot).context("failed to encode ledger")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("usage.json"));
        assert_eq!(store.load(), LedgerSnapshot::default());
    }

    #[test]
    fn partial_document_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, r#"{"guest_count": 3}"#).unwrap();

        let loaded = LedgerStore::new(&path).load();
        assert_eq!(loaded.guest_count, 3);
        assert_eq!(loaded.user_count, 0);
        assert!(!loaded.is_logged_in);
    }

    #[test]
    fn corrupt_document_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(LedgerStore::new(&path).load(), LedgerSnapshot::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("nested").join("usage.json"));

        let snapshot = LedgerSnapshot {
            guest_count: 5,
            user_count: 2,
            is_logged_in: true,
            is_subscribed: false,
        };
        store.save(&snapshot).unwrap();
        assert_eq!(store.load(), snapshot);

        // No temp file is left behind
        assert!(!store.path().with_extension("json.tmp").exists());
    }
}
