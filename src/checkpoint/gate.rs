// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Run / skip / defer classification against persisted records

use std::sync::Arc;
use tracing::debug;

use super::{CheckpointStore, RunRecord, StateKey};
use crate::errors::RankflowResult;
use crate::flow::FlowConfig;

/// What the engine should do with a step
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Dependencies are satisfied and the step has not succeeded yet
    Run,
    /// The step already succeeded; carries the stored record
    Skip(RunRecord),
    /// A dependency failed, so the step is not executed
    SkipFailed { dependency: String },
    /// At least one dependency has not produced a record yet
    Defer { waiting_on: Vec<String> },
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Skip(_) => "skip",
            Self::SkipFailed { .. } => "skip-failed",
            Self::Defer { .. } => "defer",
        }
    }
}

/// Reads and writes run records on behalf of the engine.
///
/// Records are written once per concrete execution and never updated in
/// place; aggregate statuses are computed in memory by the engine and written
/// as their own records. Per-key atomicity of the backend is therefore all
/// the synchronisation the gate needs.
#[derive(Clone)]
pub struct CheckpointGate {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointGate {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Classify the step stored at `key` whose sibling dependencies are `depends_on`.
    ///
    /// A record without a status counts as absent. A failed dependency takes
    /// precedence over one that is still missing.
    pub async fn classify(&self, key: &StateKey, depends_on: &[String]) -> RankflowResult<Decision> {
        if let Some(record) = self.store.get(key).await? {
            if record.succeeded() {
                debug!(key = %key, "already succeeded");
                return Ok(Decision::Skip(record));
            }
        }

        let mut waiting_on = Vec::new();
        for dependency in depends_on {
            let dep_key = key.sibling(dependency);
            match self.store.get(&dep_key).await? {
                Some(record) if record.failed_status() => {
                    debug!(key = %key, dependency = %dependency, "dependency failed");
                    return Ok(Decision::SkipFailed {
                        dependency: dependency.clone(),
                    });
                }
                Some(record) if record.succeeded() => {}
                _ => waiting_on.push(dependency.clone()),
            }
        }

        if waiting_on.is_empty() {
            Ok(Decision::Run)
        } else {
            debug!(key = %key, waiting_on = ?waiting_on, "dependencies not recorded yet");
            Ok(Decision::Defer { waiting_on })
        }
    }

    /// Persist the outcome of one execution and return the stored record
    pub async fn record_result(
        &self,
        key: &StateKey,
        status: bool,
        exit_code: i64,
        outputs: FlowConfig,
    ) -> RankflowResult<RunRecord> {
        let record = RunRecord::new(status, exit_code, outputs);
        self.record(key, &record).await?;
        Ok(record)
    }

    pub async fn record(&self, key: &StateKey, record: &RunRecord) -> RankflowResult<()> {
        debug!(key = %key, status = ?record.status, exit_code = record.exit_code, "recording result");
        self.store.set(key, record).await
    }

    pub async fn lookup(&self, key: &StateKey) -> RankflowResult<Option<RunRecord>> {
        self.store.get(key).await
    }

    /// Drop every record of a pipeline instance
    pub async fn clean(&self, prefix: &StateKey) -> RankflowResult<bool> {
        self.store.remove(prefix).await
    }
}
