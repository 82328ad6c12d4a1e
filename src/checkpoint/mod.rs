// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Persisted run state
//!
//! Every concrete execution of a step (and every loop iteration) leaves a
//! [`RunRecord`] under a hierarchical [`StateKey`]. The [`CheckpointGate`]
//! reads those records to decide whether a step runs, is skipped or has to
//! wait, which is what makes re-running an instance resume where it stopped.

mod filesystem;
mod fingerprint;
mod gate;
mod memory;

pub use filesystem::FilesystemStore;
pub use fingerprint::{instance_id, Fingerprint};
pub use gate::{CheckpointGate, Decision};
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RankflowResult;
use crate::flow::{FlowConfig, EXIT_CODE_KEY, STATUS_KEY};

/// Contract for checkpoint backends
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Fetch the record stored under exactly `key`
    async fn get(&self, key: &StateKey) -> RankflowResult<Option<RunRecord>>;

    /// Store a record, replacing any previous one under the same key
    async fn set(&self, key: &StateKey, record: &RunRecord) -> RankflowResult<()>;

    /// Remove every record at or below `prefix`; true if anything was removed
    async fn remove(&self, prefix: &StateKey) -> RankflowResult<bool>;

    /// List the keys at or below `prefix`, sorted
    async fn keys(&self, prefix: &StateKey) -> RankflowResult<Vec<StateKey>>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Outcome of one step execution as persisted in the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Success flag; a record without it counts as not yet written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
    #[serde(rename = "exitCode", default)]
    pub exit_code: i64,
    /// Outputs produced by the step
    #[serde(flatten)]
    pub outputs: FlowConfig,
}

impl RunRecord {
    pub fn new(status: bool, exit_code: i64, outputs: FlowConfig) -> Self {
        let mut outputs = outputs;
        outputs.remove(STATUS_KEY);
        outputs.remove(EXIT_CODE_KEY);
        Self {
            status: Some(status),
            exit_code,
            outputs,
        }
    }

    /// A failure record with no outputs
    pub fn failed(exit_code: i64) -> Self {
        Self::new(false, exit_code, FlowConfig::new())
    }

    /// Build a record from the config a tool runner returned
    pub fn from_runner_output(config: &FlowConfig, outputs: FlowConfig) -> Self {
        let status = config.status().unwrap_or(false);
        let exit_code = config
            .exit_code()
            .unwrap_or(if status { 0 } else { 1 });
        Self::new(status, exit_code, outputs)
    }

    pub fn succeeded(&self) -> bool {
        self.status == Some(true)
    }

    pub fn failed_status(&self) -> bool {
        self.status == Some(false)
    }
}

/// Hierarchical, '/'-joined key of a run record.
///
/// Layout: `<namespace>/pipelines/<instance>/<pipeline>/<step>`; nested
/// pipelines append their children below their own step key and loop
/// iterations append their index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    segments: Vec<String>,
}

impl StateKey {
    /// Key of a whole pipeline instance
    pub fn instance(namespace: &str, instance: &str) -> Self {
        Self {
            segments: vec![
                sanitize(namespace),
                "pipelines".to_string(),
                sanitize(instance),
            ],
        }
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(sanitize(segment));
        Self { segments }
    }

    /// Key of the `index`-th iteration of a loop step
    pub fn iteration(&self, index: usize) -> Self {
        self.child(&index.to_string())
    }

    /// Key of a sibling step at the same level
    pub fn sibling(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        segments.push(sanitize(segment));
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, usually the step id
    pub fn leaf(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn starts_with(&self, prefix: &StateKey) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for StateKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            segments: s
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(sanitize)
                .collect(),
        })
    }
}

/// Keep a segment usable as both a key part and a directory name
fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
