// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Error types
//!
//! Construction errors (unknown dependency, cycle, invalid definition) abort
//! a run before anything is dispatched. Every other variant is local to the
//! step that raised it and folds into the enclosing pipeline's status.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for rankflow operations
pub type RankflowResult<T> = Result<T, RankflowError>;

/// Main error type for rankflow
#[derive(Error, Debug, Diagnostic)]
pub enum RankflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Construction Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    #[diagnostic(
        code(rankflow::unknown_dependency),
        help("Dependencies must name a sibling step declared in the same pipeline")
    )]
    UnknownDependency { step: String, dependency: String },

    #[error("Cyclic dependency between steps: {}", steps.join(" -> "))]
    #[diagnostic(
        code(rankflow::cyclic_graph),
        help("Review the 'depends' fields of these steps to remove the cycle")
    )]
    CyclicGraph { steps: Vec<String> },

    #[error("Step id '{step}' is declared more than once in '{pipeline}'")]
    #[diagnostic(code(rankflow::duplicate_step))]
    DuplicateStep { pipeline: String, step: String },

    #[error("Invalid definition: {reason}")]
    #[diagnostic(code(rankflow::invalid_definition))]
    InvalidDefinition {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Definition file not found: {path}")]
    #[diagnostic(
        code(rankflow::definition_not_found),
        help("Pass the path of a YAML or JSON pipeline definition")
    )]
    DefinitionNotFound { path: PathBuf },

    // ─────────────────────────────────────────────────────────────────────────
    // Checkpoint Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Checkpoint backend failed for '{key}': {message}")]
    #[diagnostic(code(rankflow::checkpoint))]
    Checkpoint { key: String, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Step Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Script failed in step '{step}': {message}")]
    #[diagnostic(code(rankflow::script))]
    Script { step: String, message: String },

    #[error("Tool runner could not execute step '{step}': {message}")]
    #[diagnostic(
        code(rankflow::tool_execution),
        help("This is a runner failure, not a non-zero exit of the tool itself")
    )]
    ToolExecution { step: String, message: String },

    #[error("Loop variable '{variable}' of step '{step}' {reason}")]
    #[diagnostic(
        code(rankflow::loop_variable),
        help("Bind '{variable}' to a sequence in the pipeline config or with --set")
    )]
    LoopVariable {
        step: String,
        variable: String,
        reason: String,
    },

    #[error("Step '{step}' is still waiting on {} after {attempts} checks", waiting_on.join(", "))]
    #[diagnostic(
        code(rankflow::stalled_dependency),
        help("A dependency never produced a checkpoint; check that it was dispatched")
    )]
    StalledDependency {
        step: String,
        waiting_on: Vec<String>,
        attempts: u32,
    },

    #[error("Template error in '{template}': {message}")]
    #[diagnostic(code(rankflow::template))]
    Template { template: String, message: String },

    #[error("Run cancelled before step '{step}' was dispatched")]
    #[diagnostic(code(rankflow::cancelled))]
    Cancelled { step: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Run Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline run failed:\n{}", errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    #[diagnostic(code(rankflow::run_failed))]
    RunFailed {
        #[related]
        errors: Vec<RankflowError>,
    },

    #[error("Pipeline '{pipeline}' finished with failed steps")]
    #[diagnostic(
        code(rankflow::pipeline_failed),
        help("Inspect the recorded state with 'rankflow state show', fix the cause and run again to resume")
    )]
    PipelineFailed { pipeline: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(rankflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(rankflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(rankflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(rankflow::toml_error))]
    Toml { message: String },
}

impl From<std::io::Error> for RankflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for RankflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for RankflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for RankflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl RankflowError {
    /// Whether this error was raised while building or validating the graph
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::UnknownDependency { .. }
                | Self::CyclicGraph { .. }
                | Self::DuplicateStep { .. }
                | Self::InvalidDefinition { .. }
                | Self::DefinitionNotFound { .. }
        )
    }

    /// Shorthand for a checkpoint backend failure on `key`
    pub fn checkpoint(key: impl ToString, message: impl ToString) -> Self {
        Self::Checkpoint {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            reason: reason.into(),
            help: None,
        }
    }

    /// Join several errors into one, unwrapping the single-error case
    pub fn join(mut errors: Vec<RankflowError>) -> Self {
        if errors.len() == 1 {
            if let Some(only) = errors.pop() {
                return only;
            }
        }
        Self::RunFailed { errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failed_lists_every_error() {
        let err = RankflowError::join(vec![
            RankflowError::Script {
                step: "a".into(),
                message: "exit 3".into(),
            },
            RankflowError::ToolExecution {
                step: "b".into(),
                message: "no such file".into(),
            },
        ]);

        let text = err.to_string();
        assert!(text.contains("step 'a'"));
        assert!(text.contains("step 'b'"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_join_single_error_is_unwrapped() {
        let err = RankflowError::join(vec![RankflowError::Cancelled { step: "x".into() }]);
        assert!(matches!(err, RankflowError::Cancelled { .. }));
    }

    #[test]
    fn test_construction_errors() {
        assert!(RankflowError::CyclicGraph {
            steps: vec!["a".into(), "b".into()]
        }
        .is_construction());
        assert!(!RankflowError::checkpoint("k", "down").is_construction());
    }
}
