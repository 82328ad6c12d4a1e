// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Whole-tree validation
//!
//! Runs over every pipeline level before anything is dispatched, so a bad
//! reference deep in a nested pipeline aborts the run with no checkpoints
//! written.

use std::collections::HashSet;

use super::{ExecutionGraph, RankedLevels, StepDefinition};
use crate::errors::{RankflowError, RankflowResult};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Collect every problem in the tree as a report
    pub fn validate(definition: &StepDefinition) -> ValidationResult {
        let mut result = ValidationResult::new();
        Self::collect(definition, &definition.id, &mut result);
        result
    }

    /// Fail with the first construction error found, depth first
    pub fn check(definition: &StepDefinition) -> RankflowResult<()> {
        Self::check_step(definition, &definition.id)?;
        if definition.is_pipeline() {
            Self::check_level(definition, &definition.id)?;
        }
        Ok(())
    }

    fn check_level(pipeline: &StepDefinition, path: &str) -> RankflowResult<()> {
        if pipeline.steps.is_empty() {
            return Err(RankflowError::InvalidDefinition {
                reason: format!("pipeline '{}' has no steps", path),
                help: Some("Add at least one entry under 'steps'".into()),
            });
        }

        let graph = ExecutionGraph::build(pipeline)?;
        RankedLevels::compute(&graph)?;

        for step in &pipeline.steps {
            let step_path = format!("{}/{}", path, step.id);
            Self::check_step(step, &step_path)?;
            if step.is_pipeline() {
                Self::check_level(step, &step_path)?;
            }
        }

        Ok(())
    }

    fn check_step(step: &StepDefinition, path: &str) -> RankflowResult<()> {
        if step.id.trim().is_empty() {
            return Err(RankflowError::InvalidDefinition {
                reason: format!("a step under '{}' has no id", path),
                help: Some("Every step needs an 'id' unique among its siblings".into()),
            });
        }

        if step.is_loop && step.loop_var.as_deref().map_or(true, |v| v.trim().is_empty()) {
            return Err(RankflowError::InvalidDefinition {
                reason: format!("loop step '{}' has no loop_var", path),
                help: Some("Name the config key holding the sequence to iterate".into()),
            });
        }

        if step.is_tool() && step.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Err(RankflowError::InvalidDefinition {
                reason: format!("tool '{}' has no command", path),
                help: None,
            });
        }

        Ok(())
    }

    fn collect(step: &StepDefinition, path: &str, result: &mut ValidationResult) {
        if let Err(e) = Self::check_step(step, path) {
            result.add_error(&e.to_string());
        }

        for (idx, script) in step.scripts.iter().enumerate() {
            if !script.has_phase() {
                result.add_warning(&format!(
                    "Step '{}': script #{} is not marked before, after or inloop and never runs",
                    path,
                    idx + 1
                ));
            }
            if script.code.is_none() && script.file.is_none() {
                result.add_warning(&format!("Step '{}': script #{} has no code", path, idx + 1));
            }
        }

        if step.is_tool() {
            if !step.steps.is_empty() {
                result.add_warning(&format!(
                    "Step '{}': tools ignore nested 'steps'; set type: pipeline",
                    path
                ));
            }
            return;
        }

        if step.steps.is_empty() {
            result.add_error(&format!("Pipeline '{}' has no steps", path));
            return;
        }

        let mut seen = HashSet::new();
        for child in &step.steps {
            if !seen.insert(child.id.as_str()) {
                result.add_error(&format!("Duplicate step id '{}' in '{}'", child.id, path));
            }
        }

        match ExecutionGraph::build(step) {
            Ok(_) => {}
            Err(RankflowError::DuplicateStep { .. }) => {}
            Err(e) => result.add_error(&e.to_string()),
        }

        for child in &step.steps {
            if child.is_tool() && child.command.is_some() && child.image.is_none() && step.container.is_some() {
                result.add_warning(&format!(
                    "Step '{}/{}': inherits a container registry but declares no image",
                    path, child.id
                ));
            }
            Self::collect(child, &format!("{}/{}", path, child.id), result);
        }
    }

    /// Inputs the entry steps of a definition expect from the caller
    pub fn input_requirements(definition: &StepDefinition) -> Vec<InputRequirement> {
        let mut requirements = Vec::new();
        Self::collect_inputs(definition, &definition.id, &mut requirements);
        requirements
    }

    fn collect_inputs(step: &StepDefinition, path: &str, out: &mut Vec<InputRequirement>) {
        for input in &step.inputs {
            out.push(InputRequirement {
                step: path.to_string(),
                name: input.name.clone(),
                description: input.description.clone().unwrap_or_default(),
                has_default: !input.value.is_blank(),
            });
        }

        if step.is_pipeline() {
            for child in step.steps.iter().filter(|s| s.depends.is_empty()) {
                Self::collect_inputs(child, &format!("{}/{}", path, child.id), out);
            }
        }
    }
}

/// An input the caller may need to supply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequirement {
    /// Path of the step declaring it
    pub step: String,
    pub name: String,
    pub description: String,
    /// Whether the definition already provides a value
    pub has_default: bool,
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
