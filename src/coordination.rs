// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Deployment mode lookup
//!
//! A coordinator tells the engine whether it runs alone or as one worker of a
//! distributed deployment. Workers share the checkpoint store, so a remote
//! worker cannot rely on rank barriers and dispatches from the deferred queue.

use async_trait::async_trait;

use crate::errors::RankflowResult;
use crate::pipeline::DispatchStrategy;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Local,
    Remote,
}

impl ExecutionMode {
    /// Strategy to use in this mode given the configured one
    pub fn strategy(self, configured: DispatchStrategy) -> DispatchStrategy {
        match self {
            Self::Local => configured,
            Self::Remote => DispatchStrategy::Deferred,
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn execution_mode(&self) -> RankflowResult<ExecutionMode>;

    /// Coordinator name for logs
    fn name(&self) -> &str;
}

/// Coordinator answering from static configuration
#[derive(Debug, Clone)]
pub struct StaticCoordinator {
    mode: ExecutionMode,
}

impl StaticCoordinator {
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mode = if settings.remote {
            ExecutionMode::Remote
        } else {
            ExecutionMode::Local
        };
        Self::new(mode)
    }
}

#[async_trait]
impl Coordinator for StaticCoordinator {
    async fn execution_mode(&self) -> RankflowResult<ExecutionMode> {
        Ok(self.mode)
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mode_from_settings() {
        let local = StaticCoordinator::from_settings(&Settings::default());
        assert_eq!(local.execution_mode().await.unwrap(), ExecutionMode::Local);

        let settings = Settings {
            remote: true,
            ..Default::default()
        };
        let remote = StaticCoordinator::from_settings(&settings);
        assert_eq!(remote.execution_mode().await.unwrap(), ExecutionMode::Remote);
    }

    #[test]
    fn test_remote_always_defers() {
        assert_eq!(ExecutionMode::Local.strategy(DispatchStrategy::Rank), DispatchStrategy::Rank);
        assert_eq!(ExecutionMode::Remote.strategy(DispatchStrategy::Rank), DispatchStrategy::Deferred);
    }
}
