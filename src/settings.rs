// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Engine settings
//!
//! Loaded from `rankflow.toml` in the working directory, or from a file given
//! on the command line. Every field has a default, so an empty or missing file
//! gives a working local setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::coordination::ExecutionMode;
use crate::errors::{RankflowError, RankflowResult};
use crate::flow::{FlowConfig, DATA_DIR_KEY, OUTPUT_DIR_KEY};
use crate::pipeline::{DispatchStrategy, ExecutionOptions};

/// Settings file looked up in the working directory
pub const SETTINGS_FILE: &str = "rankflow.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// First segment of every checkpoint key
    pub namespace: String,
    /// Root of the filesystem checkpoint store
    pub state_dir: Option<PathBuf>,
    /// Strategy in local mode; remote mode always defers
    pub strategy: DispatchStrategy,
    /// Run as a worker of a distributed deployment
    pub remote: bool,
    pub output_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    /// Registry prefix applied to every container image
    pub registry: Option<String>,
    pub queue: QueueSettings,
    pub runner: RunnerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub poll_interval_ms: u64,
    pub max_rechecks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub shell: String,
    pub container_engine: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: "rankflow".to_string(),
            state_dir: None,
            strategy: DispatchStrategy::Rank,
            remote: false,
            output_dir: None,
            data_dir: None,
            registry: None,
            queue: QueueSettings::default(),
            runner: RunnerSettings::default(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            max_rechecks: 120,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            container_engine: "docker".to_string(),
        }
    }
}

impl Settings {
    /// Load `path`, or `rankflow.toml` from the working directory, or defaults
    pub fn load(path: Option<&Path>) -> RankflowResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let local = Path::new(SETTINGS_FILE);
                if local.is_file() {
                    Self::from_file(local)
                } else {
                    debug!("no settings file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> RankflowResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml(&content)?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> RankflowResult<Self> {
        let settings: Settings = toml::from_str(content)?;
        if settings.namespace.trim().is_empty() {
            return Err(RankflowError::invalid("settings: 'namespace' must not be empty"));
        }
        Ok(settings)
    }

    /// Directory of the filesystem checkpoint store
    pub fn resolve_state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "rankflow")
            .map(|dirs| dirs.data_dir().join("state"))
            .unwrap_or_else(|| PathBuf::from(".rankflow").join("state"))
    }

    /// Engine options for a deployment running in `mode`
    pub fn execution_options(&self, mode: ExecutionMode) -> ExecutionOptions {
        ExecutionOptions {
            namespace: self.namespace.clone(),
            strategy: mode.strategy(self.strategy),
            explain: false,
            poll_interval: Duration::from_millis(self.queue.poll_interval_ms.max(1)),
            max_rechecks: self.queue.max_rechecks,
        }
    }

    /// Initial values seeded into the root config
    pub fn seed(&self) -> FlowConfig {
        let mut config = FlowConfig::new();
        if let Some(dir) = &self.output_dir {
            config.insert(OUTPUT_DIR_KEY, dir.display().to_string());
        }
        if let Some(dir) = &self.data_dir {
            config.insert(DATA_DIR_KEY, dir.display().to_string());
        }
        config
    }
}
