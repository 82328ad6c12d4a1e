// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! In-process checkpoint store

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{CheckpointStore, RunRecord, StateKey};
use crate::errors::RankflowResult;

/// Checkpoint store backed by an ordered map; state is lost on exit
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<StateKey, RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get(&self, key: &StateKey) -> RankflowResult<Option<RunRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &StateKey, record: &RunRecord) -> RankflowResult<()> {
        self.records.write().await.insert(key.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, prefix: &StateKey) -> RankflowResult<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|key, _| !key.starts_with(prefix));
        Ok(records.len() != before)
    }

    async fn keys(&self, prefix: &StateKey) -> RankflowResult<Vec<StateKey>> {
        Ok(self
            .records
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
