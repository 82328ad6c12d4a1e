// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Filesystem-based checkpoint store
//!
//! Each key maps to a directory path below the state directory, one
//! directory per segment, holding the record as a JSON file. Prefix removal
//! is a recursive directory removal.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{CheckpointStore, RunRecord, StateKey};
use crate::errors::{RankflowError, RankflowResult};

const RECORD_FILE: &str = ".record.json";

/// Durable checkpoint store rooted at a state directory
pub struct FilesystemStore {
    state_dir: PathBuf,
}

impl FilesystemStore {
    /// Create a store, creating the state directory if needed
    pub fn new(state_dir: PathBuf) -> RankflowResult<Self> {
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                RankflowError::checkpoint(
                    state_dir.display(),
                    format!("Failed to create state directory: {}", e),
                )
            })?;
        }

        Ok(Self { state_dir })
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn key_dir(&self, key: &StateKey) -> PathBuf {
        let mut path = self.state_dir.clone();
        for segment in key.segments() {
            path.push(segment);
        }
        path
    }

    fn record_path(&self, key: &StateKey) -> PathBuf {
        self.key_dir(key).join(RECORD_FILE)
    }

    /// Collect the keys of every record below `dir`
    fn walk(dir: &Path, segments: &mut Vec<String>, out: &mut Vec<StateKey>) -> RankflowResult<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            RankflowError::checkpoint(dir.display(), format!("Failed to read state directory: {}", e))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                RankflowError::checkpoint(dir.display(), format!("Failed to read state entry: {}", e))
            })?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if path.is_dir() {
                segments.push(name);
                Self::walk(&path, segments, out)?;
                segments.pop();
            } else if name == RECORD_FILE {
                if let Ok(key) = segments.join("/").parse::<StateKey>() {
                    out.push(key);
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn get(&self, key: &StateKey) -> RankflowResult<Option<RunRecord>> {
        let path = self.record_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RankflowError::checkpoint(key, format!("Failed to read record: {}", e)))?;

        let record: RunRecord = serde_json::from_str(&content)
            .map_err(|e| RankflowError::checkpoint(key, format!("Failed to parse record: {}", e)))?;

        Ok(Some(record))
    }

    async fn set(&self, key: &StateKey, record: &RunRecord) -> RankflowResult<()> {
        let dir = self.key_dir(key);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            RankflowError::checkpoint(key, format!("Failed to create record directory: {}", e))
        })?;

        let json = serde_json::to_string_pretty(record).map_err(|e| {
            RankflowError::checkpoint(key, format!("Failed to serialize record: {}", e))
        })?;

        // Write then rename so a crash never leaves a half-written record
        let tmp = dir.join(format!("{}.tmp", RECORD_FILE));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| RankflowError::checkpoint(key, format!("Failed to write record: {}", e)))?;
        tokio::fs::rename(&tmp, dir.join(RECORD_FILE))
            .await
            .map_err(|e| RankflowError::checkpoint(key, format!("Failed to commit record: {}", e)))?;

        debug!(key = %key, "record written");
        Ok(())
    }

    async fn remove(&self, prefix: &StateKey) -> RankflowResult<bool> {
        let dir = self.key_dir(prefix);

        if !dir.exists() {
            return Ok(false);
        }

        tokio::fs::remove_dir_all(&dir).await.map_err(|e| {
            RankflowError::checkpoint(prefix, format!("Failed to remove records: {}", e))
        })?;

        Ok(true)
    }

    async fn keys(&self, prefix: &StateKey) -> RankflowResult<Vec<StateKey>> {
        let dir = self.key_dir(prefix);
        let mut keys = Vec::new();

        if !dir.is_dir() {
            return Ok(keys);
        }

        let mut segments = prefix.segments().to_vec();
        Self::walk(&dir, &mut segments, &mut keys)?;
        keys.sort();

        Ok(keys)
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}
