// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Shell runner
//!
//! Runs the rendered command with a local shell, or inside a container when
//! the step names an image.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ToolInstance, ToolRunner};
use crate::errors::{RankflowError, RankflowResult};
use crate::flow::{FlowConfig, EXIT_CODE_KEY, STATUS_KEY};

/// Default tool runner
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    container_engine: String,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>, container_engine: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            container_engine: container_engine.into(),
        }
    }

    /// Build the process for a tool invocation
    fn build_command(&self, tool: &ToolInstance) -> RankflowResult<Command> {
        let program = match &tool.image {
            Some(_) if tool.is_containerised() => &self.container_engine,
            _ => &self.shell,
        };
        let program_path = which::which(program).map_err(|_| RankflowError::ToolExecution {
            step: tool.step_id.clone(),
            message: format!("'{}' was not found in PATH", program),
        })?;

        let mut cmd = Command::new(program_path);

        match &tool.image {
            Some(image) if tool.is_containerised() => {
                cmd.arg("run").arg("--rm");
                for volume in &tool.volumes {
                    let path = volume.path.display();
                    cmd.arg("-v").arg(format!("{}:{}", path, path));
                }
                if let Some(dir) = &tool.work_dir {
                    let dir = dir.display();
                    cmd.arg("-v").arg(format!("{}:{}", dir, dir));
                    cmd.arg("-w").arg(dir.to_string());
                }
                cmd.arg(image).arg("bash").arg("-c").arg(&tool.command);
            }
            _ => {
                cmd.arg("-c").arg(&tool.command);
                if let Some(dir) = tool.work_dir.as_deref().filter(|d| d.is_dir()) {
                    cmd.current_dir(dir);
                }
            }
        }

        cmd.stdin(Stdio::null());
        Ok(cmd)
    }

    async fn keep_streams(dir: &Path, stdout: &[u8], stderr: &[u8]) -> RankflowResult<()> {
        tokio::fs::write(dir.join("stdout.out"), stdout).await?;
        tokio::fs::write(dir.join("stderr.err"), stderr).await?;
        Ok(())
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("bash", "docker")
    }
}

#[async_trait]
impl ToolRunner for ShellRunner {
    async fn run(&self, tool: &ToolInstance, config: FlowConfig) -> RankflowResult<FlowConfig> {
        if let Some(dir) = &tool.work_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut cmd = self.build_command(tool)?;
        debug!(step = %tool.step_id, command = %tool.command, "starting tool");

        let start = Instant::now();
        let output = cmd.output().await.map_err(|e| RankflowError::ToolExecution {
            step: tool.step_id.clone(),
            message: e.to_string(),
        })?;

        let exit_code = output.status.code().map(i64::from).unwrap_or(-1);
        info!(
            step = %tool.step_id,
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "tool finished"
        );

        if !tool.shadow {
            if let Some(dir) = &tool.work_dir {
                Self::keep_streams(dir, &output.stdout, &output.stderr).await?;
            }
        }

        let mut result = config;
        result.insert(STATUS_KEY, output.status.success());
        result.insert(EXIT_CODE_KEY, exit_code);
        Ok(result)
    }

    fn name(&self) -> &str {
        "shell"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_tool(command: &str) -> ToolInstance {
        ToolInstance {
            pipeline_id: "p".into(),
            step_id: "t".into(),
            name: "t".into(),
            command: command.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_successful_command() {
        let result = ShellRunner::default()
            .run(&make_tool("true"), FlowConfig::new())
            .await
            .unwrap();

        assert_eq!(result.status(), Some(true));
        assert_eq!(result.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_result() {
        let result = ShellRunner::default()
            .run(&make_tool("exit 3"), FlowConfig::new())
            .await
            .unwrap();

        assert_eq!(result.status(), Some(false));
        assert_eq!(result.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn test_streams_kept_in_work_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut tool = make_tool("echo hello; echo oops >&2");
        tool.work_dir = Some(temp_dir.path().join("p_t"));

        ShellRunner::default().run(&tool, FlowConfig::new()).await.unwrap();

        let stdout = std::fs::read_to_string(temp_dir.path().join("p_t/stdout.out")).unwrap();
        let stderr = std::fs::read_to_string(temp_dir.path().join("p_t/stderr.err")).unwrap();
        assert_eq!(stdout.trim(), "hello");
        assert_eq!(stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_missing_shell_is_a_runner_error() {
        let runner = ShellRunner::new("no-such-shell-rankflow", "docker");
        let err = runner.run(&make_tool("true"), FlowConfig::new()).await.unwrap_err();
        assert!(matches!(err, RankflowError::ToolExecution { .. }));
    }
}
