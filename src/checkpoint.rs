//! Checkpoint store: a single JSON document under
//! `state/checkpoints.json`, shape `{"processed_files": {basename: record}}`.
//! Persisted atomically via a temp-file-then-rename.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::{CheckpointRecord, CheckpointStatus};
use crate::security;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default)]
    pub processed_files: BTreeMap<String, CheckpointRecord>,
}

impl CheckpointState {
    /// Reads the checkpoint at `path`. A missing file or one that fails to
    /// parse is treated as empty state (the latter logged at `warn`), per
    /// failure semantics.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => state,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to parse checkpoint; treating as empty");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read checkpoint; treating as empty");
                Self::default()
            }
        }
    }

    /// Persists the checkpoint atomically: write to a temp file in the same
    /// directory, then rename over the target.
    pub fn save(&self, path: &Path) -> Result<()> {
        security::atomic_write_json(path, self)
    }

    pub fn is_success(&self, basename: &str) -> bool {
        self.processed_files
            .get(basename)
            .is_some_and(|r| r.status == CheckpointStatus::Success)
    }

    pub fn record(&mut self, basename: String, record: CheckpointRecord) {
        self.processed_files.insert(basename, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn missing_checkpoint_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = CheckpointState::load(&dir.path().join("nope.json"));
        assert!(state.processed_files.is_empty());
    }

    #[test]
    fn unparseable_checkpoint_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        std::fs::write(&path, b"not json").unwrap();
        let state = CheckpointState::load(&path);
        assert!(state.processed_files.is_empty());
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("checkpoints.json");
        let mut state = CheckpointState::default();
        state.record(
            "a.parquet".to_string(),
            CheckpointRecord {
                checksum: "deadbeef".to_string(),
                rows: 2,
                status: CheckpointStatus::Success,
                processed_at: Utc::now(),
            },
        );
        state.save(&path).unwrap();

        let reloaded = CheckpointState::load(&path);
        assert!(reloaded.is_success("a.parquet"));
        assert!(!reloaded.is_success("b.parquet"));
    }
}
