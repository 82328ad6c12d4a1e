// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Tool runners and script hooks
//!
//! The engine decides what runs and when; the traits here do the actual
//! work. A runner executes one rendered tool invocation, a hook runs the
//! user scripts attached to a step.

mod script;
mod shell;

pub use script::ShellScriptHook;
pub use shell::ShellRunner;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::errors::RankflowResult;
use crate::flow::FlowConfig;
use crate::pipeline::Script;

/// A host directory made visible to a containerised tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Name of the parameter it came from
    pub name: String,
    pub path: PathBuf,
}

/// One fully rendered invocation of a tool step
#[derive(Debug, Clone, Default)]
pub struct ToolInstance {
    pub pipeline_id: String,
    pub step_id: String,
    pub name: String,
    /// Checkpoint key of this invocation
    pub state_key: String,
    /// Command after template rendering
    pub command: String,
    /// Full image reference; the tool runs in a container when set
    pub image: Option<String>,
    pub volumes: Vec<Volume>,
    /// Step output folder, used as working directory
    pub work_dir: Option<PathBuf>,
    /// Names of the declared outputs
    pub outputs: Vec<String>,
    /// Do not keep stdout/stderr files
    pub shadow: bool,
    pub loop_index: Option<usize>,
}

impl ToolInstance {
    pub fn is_containerised(&self) -> bool {
        self.image.as_deref().map_or(false, |image| image.len() > 1)
    }
}

/// Executes tool invocations.
///
/// The returned config must carry `status` and `exitCode`. A non-zero exit
/// is a normal failed result; `Err` means the runner itself could not start
/// the tool.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, tool: &ToolInstance, config: FlowConfig) -> RankflowResult<FlowConfig>;

    /// Runner name for logs
    fn name(&self) -> &str;
}

/// Runs user scripts around a step. Scripts may change the config they get,
/// including setting `impede` to skip the tool.
#[async_trait]
pub trait ScriptHook: Send + Sync {
    async fn run_before(&self, script: &Script, config: &mut FlowConfig) -> RankflowResult<()>;

    async fn run_after(&self, script: &Script, config: &mut FlowConfig) -> RankflowResult<()>;

    /// Scripts marked `inloop`, run before each iteration
    async fn run_in_loop(&self, script: &Script, config: &mut FlowConfig) -> RankflowResult<()> {
        self.run_before(script, config).await
    }
}
