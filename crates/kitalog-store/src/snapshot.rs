// ABOUTME: Single-slot fallback snapshot for buffered-but-unpersisted log drafts.
// ABOUTME: Writes with atomic tmp + fsync + rename so a crash never leaves a torn snapshot.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use kitalog_core::LogDraft;
use thiserror::Error;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single named snapshot slot holding a JSON array of log drafts. Saving
/// replaces the previous snapshot; ids and timestamps are reassigned when the
/// drafts are re-persisted.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Save the drafts to the slot using atomic write (tmp, fsync, rename).
    /// Creates the parent directory if it does not exist.
    pub fn save(&self, drafts: &[LogDraft]) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string(drafts)?;

        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }

    /// Load the slot contents. Returns None if no snapshot exists.
    pub fn load(&self) -> Result<Option<Vec<LogDraft>>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let drafts: Vec<LogDraft> = serde_json::from_str(&contents)?;
        Ok(Some(drafts))
    }

    /// Remove the slot. A no-op when it does not exist.
    pub fn clear(&self) -> Result<(), SnapshotError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitalog_core::LogLevel;
    use tempfile::TempDir;

    fn make_drafts() -> Vec<LogDraft> {
        vec![
            LogDraft {
                level: LogLevel::Info,
                message: "first".to_string(),
                prefix: Some("[SNAP]".to_string()),
                stack: None,
            },
            LogDraft {
                level: LogLevel::Error,
                message: "second".to_string(),
                prefix: Some("[SNAP]".to_string()),
                stack: Some("trace".to_string()),
            },
        ]
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let slot = SnapshotStore::new(dir.path().join("pending_logs.json"));

        let drafts = make_drafts();
        slot.save(&drafts).unwrap();

        let loaded = slot.load().unwrap().expect("snapshot should exist");
        assert_eq!(loaded, drafts);
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let slot = SnapshotStore::new(dir.path().join("pending_logs.json"));

        slot.save(&make_drafts()).unwrap();
        slot.save(&make_drafts()[..1]).unwrap();

        let loaded = slot.load().unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].message, "first");
    }

    #[test]
    fn load_returns_none_when_absent() {
        let dir = TempDir::new().unwrap();
        let slot = SnapshotStore::new(dir.path().join("pending_logs.json"));
        assert!(slot.load().unwrap().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let slot = SnapshotStore::new(dir.path().join("pending_logs.json"));

        slot.save(&make_drafts()).unwrap();
        slot.clear().unwrap();
        assert!(slot.load().unwrap().is_none());

        // Clearing an already-empty slot must not error.
        slot.clear().unwrap();
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let slot = SnapshotStore::new(dir.path().join("deep").join("pending_logs.json"));

        slot.save(&make_drafts()).unwrap();
        assert!(slot.load().unwrap().is_some());
    }
}
