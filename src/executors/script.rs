// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Shell script hook
//!
//! Scripts see the step config as environment variables and write back to
//! it by printing `::set key=value` lines on stdout.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::ScriptHook;
use crate::errors::{RankflowError, RankflowResult};
use crate::flow::{FlowConfig, FlowValue};
use crate::pipeline::Script;

const SET_PREFIX: &str = "::set ";

/// Default script hook running scripts with a local interpreter
#[derive(Debug, Clone)]
pub struct ShellScriptHook {
    shell: String,
}

impl ShellScriptHook {
    pub fn new(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }

    async fn execute(&self, script: &Script, config: &mut FlowConfig) -> RankflowResult<()> {
        let source = script.source()?;
        if source.trim().is_empty() {
            return Ok(());
        }

        let interpreter = script.script_type.as_deref().unwrap_or(&self.shell);
        let program = which::which(interpreter).map_err(|_| RankflowError::Script {
            step: String::new(),
            message: format!("interpreter '{}' was not found in PATH", interpreter),
        })?;

        let mut cmd = Command::new(program);
        cmd.arg("-c").arg(&source).stdin(Stdio::null());
        for (key, value) in config.iter() {
            if is_env_name(key) {
                cmd.env(key, value.to_string());
            }
        }

        let output = cmd.output().await.map_err(|e| RankflowError::Script {
            step: String::new(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RankflowError::Script {
                step: String::new(),
                message: format!(
                    "exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        for (key, value) in parse_assignments(&String::from_utf8_lossy(&output.stdout)) {
            debug!(key = %key, "script set config value");
            config.insert(key, value);
        }

        Ok(())
    }
}

impl Default for ShellScriptHook {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait]
impl ScriptHook for ShellScriptHook {
    async fn run_before(&self, script: &Script, config: &mut FlowConfig) -> RankflowResult<()> {
        self.execute(script, config).await
    }

    async fn run_after(&self, script: &Script, config: &mut FlowConfig) -> RankflowResult<()> {
        self.execute(script, config).await
    }
}

fn is_env_name(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Extract `::set key=value` lines
fn parse_assignments(stdout: &str) -> Vec<(String, FlowValue)> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(SET_PREFIX))
        .filter_map(|rest| rest.split_once('='))
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), FlowValue::parse_literal(value.trim())))
        .collect()
}
