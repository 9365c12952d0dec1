//! Crash-safe checkpoint file for the OAI-PMH harvest (spec.md §4.2/§5/§9).
//!
//! The resumption token and page counter live in a small JSON file next to
//! the store rather than inside it, so a crash mid-harvest never leaves the
//! store itself in a half-written state for this concern. Written via
//! write-to-temp-then-rename so a crash mid-write never corrupts the
//! previous checkpoint.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub resumption_token: String,
    pub page: u64,
}

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<Checkpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let checkpoint = serde_json::from_str(&contents)
            .map_err(|e| CoreError::Checkpoint(format!("corrupt checkpoint file: {e}")))?;
        Ok(Some(checkpoint))
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        let contents = serde_json::to_string(checkpoint)?;
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrips_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join(".harvest-checkpoint"));
        assert!(store.load().unwrap().is_none());

        let cp = Checkpoint {
            resumption_token: "abc123".to_string(),
            page: 42,
        };
        store.save(&cp).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.resumption_token, "abc123");
        assert_eq!(loaded.page, 42);
    }

    #[test]
    fn clear_removes_file() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join(".harvest-checkpoint"));
        store
            .save(&Checkpoint {
                resumption_token: "x".to_string(),
                page: 1,
            })
            .unwrap();
        assert!(store.path().exists());
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_is_reported_not_panicked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".harvest-checkpoint");
        std::fs::write(&path, "not json").unwrap();
        let store = CheckpointStore::new(path);
        assert!(store.load().is_err());
    }
}
