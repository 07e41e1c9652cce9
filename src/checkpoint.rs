//! Resume cursor persisted between runs.
//!
//! Exactly one live checkpoint exists at a time; each save overwrites the
//! file in place. The checkpoint is advisory only: the backlog query remains
//! authoritative over what is already embedded, so losing a checkpoint costs
//! redundant scanning, never data loss or duplication.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted resumption cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last recipe id successfully persisted.
    pub last_recipe_id: String,
    /// Cumulative successful count at save time.
    pub processed: u64,
    /// When the checkpoint was written.
    pub timestamp: DateTime<Utc>,
}

/// Saves and loads the single checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    /// Creates a manager for the given checkpoint path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort save: persistence failures are logged and swallowed.
    pub fn save(&self, last_recipe_id: &str, processed: u64) {
        let checkpoint = Checkpoint {
            last_recipe_id: last_recipe_id.to_string(),
            processed,
            timestamp: Utc::now(),
        };
        match self.write(&checkpoint) {
            Ok(()) => {
                tracing::debug!(last_recipe_id, processed, "checkpoint saved");
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %self.path.display(),
                    "failed to save checkpoint"
                );
            }
        }
    }

    fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(checkpoint)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write checkpoint {:?}", self.path))?;
        Ok(())
    }

    /// Loads the checkpoint if present and readable.
    ///
    /// A missing file is a normal first-run condition; an unreadable or
    /// corrupt file is logged and treated as absent.
    pub fn load(&self) -> Option<Checkpoint> {
        if !self.path.exists() {
            return None;
        }
        let parsed = fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<Checkpoint>(&raw).map_err(Into::into));
        match parsed {
            Ok(checkpoint) => {
                tracing::info!(
                    last_recipe_id = %checkpoint.last_recipe_id,
                    processed = checkpoint.processed,
                    "loaded checkpoint"
                );
                Some(checkpoint)
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %self.path.display(),
                    "failed to load checkpoint"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("checkpoint.json"));
        manager.save("recipe-042", 420);

        let checkpoint = manager.load().expect("checkpoint present");
        assert_eq!(checkpoint.last_recipe_id, "recipe-042");
        assert_eq!(checkpoint.processed, 420);
    }

    #[test]
    fn load_returns_none_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("absent.json"));
        assert!(manager.load().is_none());
    }

    #[test]
    fn load_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, "not json at all").unwrap();
        assert!(CheckpointManager::new(&path).load().is_none());
    }

    #[test]
    fn save_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("checkpoint.json"));
        manager.save("recipe-001", 100);
        manager.save("recipe-200", 200);

        let checkpoint = manager.load().expect("checkpoint present");
        assert_eq!(checkpoint.last_recipe_id, "recipe-200");
        assert_eq!(checkpoint.processed, 200);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("tmp/nested/checkpoint.json"));
        manager.save("recipe-007", 7);
        assert!(manager.load().is_some());
    }
}
