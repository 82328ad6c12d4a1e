// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Per-step execution: classify, prepare the overlay, run scripts, then
//! dispatch a tool, a tool loop, a nested pipeline or a pipeline loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::executor::{ExecutionEvent, PipelineExecutor, StepOutcome, StepReport};
use super::transform::apply_all;
use super::{ContainerConfig, Parameter, Script, StepDefinition, StepKind};
use crate::checkpoint::{Decision, RunRecord, StateKey};
use crate::errors::{RankflowError, RankflowResult};
use crate::executors::{ToolInstance, Volume};
use crate::flow::{
    loop_item_key, FlowConfig, FlowValue, COMMAND_KEY, IMPEDE_KEY, LOCATION_KEY, LOOP_INDEX_KEY,
    OUTPUT_DIR_KEY, SELF_DIR_KEY,
};

/// Exit code recorded when a step fails without a process exit code
const FAILURE_EXIT_CODE: i64 = 1;

/// Settings a nested pipeline hands down to its descendants
#[derive(Debug, Clone, Default)]
pub(crate) struct Inherited {
    pub(crate) container: Option<ContainerConfig>,
    pub(crate) volumes: Vec<Volume>,
}

impl Inherited {
    /// Inherited volumes plus `own`, unique by name; a step's own volume wins
    fn with_volumes(&self, own: Vec<Volume>) -> Vec<Volume> {
        let mut volumes: Vec<Volume> = self
            .volumes
            .iter()
            .filter(|v| !own.iter().any(|o| o.name == v.name))
            .cloned()
            .collect();
        for volume in own {
            if !volumes.iter().any(|v| v.name == volume.name) {
                volumes.push(volume);
            }
        }
        volumes
    }
}

/// One step ready to be executed on its own overlay
pub(crate) struct StepTask {
    pub(crate) step: StepDefinition,
    pub(crate) key: StateKey,
    pub(crate) pipeline_id: String,
    pub(crate) config: FlowConfig,
    pub(crate) inherited: Inherited,
}

pub(crate) enum Dispatch {
    Done(StepRun),
    /// Dependencies have not recorded a result yet
    Deferred(Vec<String>),
}

#[derive(Debug)]
pub(crate) struct StepRun {
    pub(crate) outcome: StepOutcome,
    /// Record visible to the parent; outputs flow from here
    pub(crate) record: Option<RunRecord>,
    pub(crate) reports: Vec<StepReport>,
    pub(crate) errors: Vec<RankflowError>,
}

impl StepRun {
    fn new(outcome: StepOutcome, record: Option<RunRecord>) -> Self {
        Self {
            outcome,
            record,
            reports: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn with_error(mut self, error: RankflowError) -> Self {
        self.errors.push(error);
        self
    }

    fn reported(mut self, key: &StateKey, start: Instant) -> Self {
        self.reports.push(StepReport {
            key: key.to_string(),
            step: key.leaf().to_string(),
            outcome: self.outcome,
            exit_code: self.record.as_ref().map(|r| r.exit_code),
            duration: start.elapsed(),
        });
        self
    }

    pub(crate) fn cancelled(key: &StateKey) -> Self {
        Self::new(StepOutcome::Cancelled, None)
            .with_error(RankflowError::Cancelled {
                step: key.leaf().to_string(),
            })
            .reported(key, Instant::now())
    }

    pub(crate) fn stalled(key: &StateKey, waiting_on: Vec<String>, attempts: u32) -> Self {
        Self::new(StepOutcome::Stalled, None)
            .with_error(RankflowError::StalledDependency {
                step: key.leaf().to_string(),
                waiting_on,
                attempts,
            })
            .reported(key, Instant::now())
    }

    /// A failure that could not be recorded, e.g. the backend is unreachable
    pub(crate) fn errored(key: &StateKey, error: RankflowError) -> Self {
        Self::new(StepOutcome::Failed, None)
            .with_error(error)
            .reported(key, Instant::now())
    }
}

/// Declared output values of `step` as found in `config`
fn declared_outputs(step: &StepDefinition, config: &FlowConfig) -> FlowConfig {
    step.outputs
        .iter()
        .filter_map(|p| config.get(&p.name).map(|v| (p.name.clone(), v.clone())))
        .collect()
}

fn script_error(step: &str, error: RankflowError) -> RankflowError {
    match error {
        RankflowError::Script { message, .. } => RankflowError::Script {
            step: step.to_string(),
            message,
        },
        other => RankflowError::Script {
            step: step.to_string(),
            message: other.to_string(),
        },
    }
}

impl PipelineExecutor {
    pub(crate) async fn run_step(&self, task: StepTask) -> Dispatch {
        let start = Instant::now();
        let StepTask {
            mut step,
            key,
            pipeline_id,
            config,
            inherited,
        } = task;

        if self.inner.cancel.is_cancelled() {
            return Dispatch::Done(StepRun::cancelled(&key));
        }

        if let Err(e) = apply_all(&self.inner.transforms, &mut step, &config) {
            let run = self.failed(&key, e, FAILURE_EXIT_CODE).await;
            return Dispatch::Done(run.reported(&key, start));
        }

        let run = if self.inner.options.explain {
            self.dispatch(&step, &key, &pipeline_id, config, &inherited).await
        } else {
            match self.inner.gate.classify(&key, &step.depends).await {
                Ok(Decision::Run) => self.dispatch(&step, &key, &pipeline_id, config, &inherited).await,
                Ok(Decision::Skip(record)) => {
                    info!(key = %key, "already succeeded, skipping");
                    StepRun::new(StepOutcome::Skipped, Some(record))
                }
                Ok(Decision::SkipFailed { dependency }) => {
                    info!(key = %key, dependency = %dependency, "dependency failed, skipping");
                    let mut run = StepRun::new(StepOutcome::SkippedFailed, None);
                    run.record = self.persist(&key, RunRecord::failed(FAILURE_EXIT_CODE), &mut run.errors).await;
                    run
                }
                Ok(Decision::Defer { waiting_on }) => return Dispatch::Deferred(waiting_on),
                Err(e) => StepRun::new(StepOutcome::Failed, None).with_error(e),
            }
        };

        self.emit(ExecutionEvent::StepFinished {
            key: key.to_string(),
            step: step.id.clone(),
            outcome: run.outcome,
        });
        Dispatch::Done(run.reported(&key, start))
    }

    /// Write a record unless explaining; returns the record the parent sees
    async fn persist(&self, key: &StateKey, record: RunRecord, errors: &mut Vec<RankflowError>) -> Option<RunRecord> {
        if self.inner.options.explain {
            return Some(record);
        }
        match self.inner.gate.record(key, &record).await {
            Ok(()) => Some(record),
            Err(e) => {
                errors.push(e);
                None
            }
        }
    }

    /// Record a failure at `key` and return the failed run
    async fn failed(&self, key: &StateKey, error: RankflowError, exit_code: i64) -> StepRun {
        warn!(key = %key, error = %error, "step failed");
        let mut run = StepRun::new(StepOutcome::Failed, None).with_error(error);
        run.record = self.persist(key, RunRecord::failed(exit_code), &mut run.errors).await;
        run
    }

    async fn dispatch(
        &self,
        step: &StepDefinition,
        key: &StateKey,
        pipeline_id: &str,
        mut config: FlowConfig,
        inherited: &Inherited,
    ) -> StepRun {
        self.emit(ExecutionEvent::StepDispatched {
            key: key.to_string(),
            step: step.id.clone(),
        });
        debug!(key = %key, kind = %step.kind(), "running step");

        if let Err(e) = self.prepare(step, pipeline_id, &mut config) {
            return self.failed(key, e, FAILURE_EXIT_CODE).await;
        }

        for script in step.before_scripts() {
            if let Err(e) = self.inner.scripts.run_before(script, &mut config).await {
                let error = script_error(&step.id, e);
                self.after_scripts(step, &mut config).await;
                return self.failed(key, error, FAILURE_EXIT_CODE).await;
            }
        }

        let run = if config.is_impeded() {
            info!(key = %key, "impeded by script, not running");
            let mut run = StepRun::new(StepOutcome::Impeded, None);
            let record = RunRecord::new(true, 0, declared_outputs(step, &config));
            run.record = self.persist(key, record, &mut run.errors).await;
            run
        } else {
            match (step.kind(), step.is_loop) {
                (StepKind::Tool, false) => self.run_tool(step, key, pipeline_id, &mut config, inherited).await,
                (StepKind::Tool, true) => self.run_tool_loop(step, key, pipeline_id, &config, inherited).await,
                (StepKind::Pipeline, false) => self.run_nested(step, key, &mut config, inherited).await,
                (StepKind::Pipeline, true) => self.run_nested_loop(step, key, &config, inherited).await,
            }
        };

        self.after_scripts(step, &mut config).await;
        run
    }

    /// After-scripts never change the recorded outcome
    async fn after_scripts(&self, step: &StepDefinition, config: &mut FlowConfig) {
        for script in step.after_scripts() {
            if let Err(e) = self.inner.scripts.run_after(script, config).await {
                warn!(step = %step.id, error = %e, "after-script failed");
            }
        }
    }

    /// Seed step directories, evaluate parameters, reset `impede` and `command`
    fn prepare(&self, step: &StepDefinition, pipeline_id: &str, config: &mut FlowConfig) -> RankflowResult<()> {
        if let Some(output_dir) = config.get(OUTPUT_DIR_KEY).filter(|v| !v.is_blank()) {
            let self_dir = PathBuf::from(output_dir.to_string())
                .join(format!("{}_{}", pipeline_id, step.id))
                .display()
                .to_string();
            config.insert(SELF_DIR_KEY, self_dir.clone());
            config.insert(LOCATION_KEY, self_dir.clone());
            config.insert(format!("{}_dir", step.id), self_dir);
        }

        // Values passed in by the caller take precedence over input defaults
        for param in &step.inputs {
            if config.get(&param.name).map_or(false, |v| !v.is_blank()) {
                continue;
            }
            self.evaluate(param, config)?;
        }
        for param in step.config.iter().chain(&step.outputs) {
            self.evaluate(param, config)?;
        }

        config.insert(IMPEDE_KEY, false);
        match (&step.command, step.kind()) {
            (Some(command), StepKind::Tool) => {
                config.insert(COMMAND_KEY, command.clone());
            }
            _ => {
                config.remove(COMMAND_KEY);
            }
        }
        Ok(())
    }

    fn evaluate(&self, param: &Parameter, config: &mut FlowConfig) -> RankflowResult<()> {
        if param.value.is_null() {
            config.insert_default(&param.name);
            return Ok(());
        }
        let value = self.inner.renderer.render_value(&param.value, config)?;
        config.insert(param.name.clone(), value);
        Ok(())
    }

    /// Directory parameters of `step` with a resolved value
    fn own_volumes(step: &StepDefinition, config: &FlowConfig) -> Vec<Volume> {
        step.inputs
            .iter()
            .chain(&step.config)
            .chain(&step.outputs)
            .filter_map(|p| {
                let value = config.get(&p.name)?;
                p.is_attachable(value).then(|| Volume {
                    name: p.name.clone(),
                    path: PathBuf::from(value.to_string()),
                })
            })
            .collect()
    }

    fn tool_instance(
        &self,
        step: &StepDefinition,
        key: &StateKey,
        pipeline_id: &str,
        config: &FlowConfig,
        inherited: &Inherited,
        loop_index: Option<usize>,
    ) -> RankflowResult<ToolInstance> {
        let template = config.get(COMMAND_KEY).map(FlowValue::to_string).unwrap_or_default();
        let command = self.inner.renderer.render(&template, config)?;

        let container = step.container.as_ref().or(inherited.container.as_ref());
        let image = step
            .image
            .as_deref()
            .filter(|image| !image.trim().is_empty())
            .map(|image| match container {
                Some(container) => container.image_reference(image),
                None => image.to_string(),
            });

        Ok(ToolInstance {
            pipeline_id: pipeline_id.to_string(),
            step_id: step.id.clone(),
            name: step.display_name().to_string(),
            state_key: key.to_string(),
            command,
            image,
            volumes: inherited.with_volumes(Self::own_volumes(step, config)),
            work_dir: config
                .get(SELF_DIR_KEY)
                .filter(|v| !v.is_blank())
                .map(|v| PathBuf::from(v.to_string())),
            outputs: step.outputs.iter().map(|p| p.name.clone()).collect(),
            shadow: step.shadow,
            loop_index,
        })
    }

    /// Invoke the runner once; the returned config replaces `config`
    async fn invoke(&self, tool: &ToolInstance, config: &mut FlowConfig) -> RankflowResult<RunRecord> {
        if self.inner.options.explain {
            info!(key = %tool.state_key, command = %tool.command, image = ?tool.image, "explain");
            return Ok(RunRecord::new(true, 0, FlowConfig::new()));
        }

        let returned = self.inner.runner.run(tool, config.clone()).await.map_err(|e| match e {
            RankflowError::ToolExecution { .. } => e,
            other => RankflowError::ToolExecution {
                step: tool.step_id.clone(),
                message: other.to_string(),
            },
        })?;
        *config = returned;

        let outputs = tool
            .outputs
            .iter()
            .filter_map(|name| config.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        Ok(RunRecord::from_runner_output(config, outputs))
    }

    async fn run_tool(
        &self,
        step: &StepDefinition,
        key: &StateKey,
        pipeline_id: &str,
        config: &mut FlowConfig,
        inherited: &Inherited,
    ) -> StepRun {
        let tool = match self.tool_instance(step, key, pipeline_id, config, inherited, None) {
            Ok(tool) => tool,
            Err(e) => return self.failed(key, e, FAILURE_EXIT_CODE).await,
        };

        match self.invoke(&tool, config).await {
            Ok(record) if self.inner.options.explain => StepRun::new(StepOutcome::Explained, Some(record)),
            Ok(record) => {
                let outcome = if record.succeeded() {
                    StepOutcome::Succeeded
                } else {
                    warn!(key = %key, exit_code = record.exit_code, "tool failed");
                    StepOutcome::Failed
                };
                let mut run = StepRun::new(outcome, None);
                run.record = self.persist(key, record, &mut run.errors).await;
                run
            }
            Err(e) => self.failed(key, e, FAILURE_EXIT_CODE).await,
        }
    }

    /// Resolve the loop variable of `step` to its elements
    fn loop_items(step: &StepDefinition, config: &FlowConfig) -> RankflowResult<Vec<FlowValue>> {
        let variable = step.loop_var.clone().unwrap_or_default();
        match config.lookup(&variable) {
            Some(FlowValue::List(items)) => Ok(items.clone()),
            Some(other) => Err(RankflowError::LoopVariable {
                step: step.id.clone(),
                variable,
                reason: format!("expected a sequence, found {}", other.kind()),
            }),
            None => Err(RankflowError::LoopVariable {
                step: step.id.clone(),
                variable,
                reason: "not set".to_string(),
            }),
        }
    }

    /// Overlay for iteration `index`, with loop variables and re-rendered outputs
    fn iteration_config(
        &self,
        step: &StepDefinition,
        config: &FlowConfig,
        index: usize,
        item: &FlowValue,
    ) -> RankflowResult<FlowConfig> {
        let mut iteration = config.overlay();
        iteration.insert(LOOP_INDEX_KEY, index as i64);
        iteration.insert(loop_item_key(step.loop_var.as_deref().unwrap_or_default()), item.clone());
        for param in &step.outputs {
            self.evaluate(param, &mut iteration)?;
        }
        Ok(iteration)
    }

    /// Declared outputs plus loop variables of one iteration
    fn iteration_outputs(step: &StepDefinition, config: &FlowConfig) -> FlowConfig {
        let mut outputs = declared_outputs(step, config);
        let item_key = loop_item_key(step.loop_var.as_deref().unwrap_or_default());
        for name in [LOOP_INDEX_KEY, item_key.as_str()] {
            if let Some(value) = config.get(name) {
                outputs.insert(name, value.clone());
            }
        }
        outputs
    }

    async fn loop_scripts(&self, step: &StepDefinition, config: &mut FlowConfig) -> RankflowResult<()> {
        let scripts: Vec<&Script> = step.loop_scripts();
        for script in scripts {
            self.inner
                .scripts
                .run_in_loop(script, config)
                .await
                .map_err(|e| script_error(&step.id, e))?;
        }
        Ok(())
    }

    /// Record the aggregate of a finished loop at `key`
    async fn finish_loop(&self, step: &StepDefinition, key: &StateKey, mut run: LoopRun) -> StepRun {
        let mut outputs = FlowConfig::new();
        for param in &step.outputs {
            let values: Vec<FlowValue> = run
                .outputs
                .iter()
                .map(|o| o.get(&param.name).cloned().unwrap_or(FlowValue::Null))
                .collect();
            outputs.insert(param.name.clone(), FlowValue::List(values));
        }

        if self.inner.options.explain {
            let mut explained = StepRun::new(StepOutcome::Explained, None);
            explained.reports = run.reports;
            explained.errors = run.errors;
            return explained;
        }

        let exit_code = if run.status { 0 } else { FAILURE_EXIT_CODE };
        let record = RunRecord::new(run.status, exit_code, outputs);
        let outcome = if run.status {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed
        };
        let mut step_run = StepRun::new(outcome, None);
        step_run.record = self.persist(key, record, &mut run.errors).await;
        step_run.reports = run.reports;
        step_run.errors = run.errors;
        step_run
    }

    /// Reuse a successful iteration recorded by an earlier run
    async fn recorded_iteration(&self, key: &StateKey, run: &mut LoopRun) -> bool {
        if self.inner.options.explain {
            return false;
        }
        match self.inner.gate.lookup(key).await {
            Ok(Some(record)) if record.succeeded() => {
                debug!(key = %key, "iteration already succeeded");
                run.outputs.push(record.outputs);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(key = %key, error = %e, "could not read iteration record");
                false
            }
        }
    }

    async fn run_tool_loop(
        &self,
        step: &StepDefinition,
        key: &StateKey,
        pipeline_id: &str,
        config: &FlowConfig,
        inherited: &Inherited,
    ) -> StepRun {
        let items = match Self::loop_items(step, config) {
            Ok(items) => items,
            Err(e) => return self.failed(key, e, FAILURE_EXIT_CODE).await,
        };
        info!(key = %key, iterations = items.len(), "running tool loop");

        let mut run = LoopRun::new();
        for (index, item) in items.iter().enumerate() {
            let iteration_key = key.iteration(index);
            if self.recorded_iteration(&iteration_key, &mut run).await {
                continue;
            }
            if self.inner.cancel.is_cancelled() {
                run.fail(RankflowError::Cancelled {
                    step: iteration_key.to_string(),
                });
                break;
            }

            let result = async {
                let mut iteration = self.iteration_config(step, config, index, item)?;
                iteration.insert(IMPEDE_KEY, false);
                self.loop_scripts(step, &mut iteration).await?;
                if iteration.is_impeded() {
                    info!(key = %iteration_key, "iteration impeded by script");
                    return Ok((RunRecord::new(true, 0, FlowConfig::new()), iteration));
                }
                let tool = self.tool_instance(step, &iteration_key, pipeline_id, &iteration, inherited, Some(index))?;
                let record = self.invoke(&tool, &mut iteration).await?;
                Ok::<_, RankflowError>((record, iteration))
            }
            .await;

            match result {
                Ok((record, iteration)) => {
                    let record = RunRecord::new(
                        record.succeeded(),
                        record.exit_code,
                        Self::iteration_outputs(step, &iteration),
                    );
                    if !record.succeeded() {
                        warn!(key = %iteration_key, exit_code = record.exit_code, "iteration failed");
                    }
                    run.status &= record.succeeded();
                    // One entry per iteration even when the write fails
                    let outputs = record.outputs.clone();
                    let _ = self.persist(&iteration_key, record, &mut run.errors).await;
                    run.outputs.push(outputs);
                }
                Err(e) => {
                    warn!(key = %iteration_key, error = %e, "iteration failed");
                    let _ = self
                        .persist(&iteration_key, RunRecord::failed(FAILURE_EXIT_CODE), &mut run.errors)
                        .await;
                    run.outputs.push(FlowConfig::new());
                    run.fail(e);
                }
            }
        }

        self.finish_loop(step, key, run).await
    }

    /// Overlay and inherited settings for the children of a nested pipeline
    fn child_scope(step: &StepDefinition, config: &FlowConfig, inherited: &Inherited) -> Inherited {
        Inherited {
            container: step.container.clone().or_else(|| inherited.container.clone()),
            volumes: inherited.with_volumes(Self::own_volumes(step, config)),
        }
    }

    async fn run_nested(
        &self,
        step: &StepDefinition,
        key: &StateKey,
        config: &mut FlowConfig,
        inherited: &Inherited,
    ) -> StepRun {
        let scope = Self::child_scope(step, config, inherited);
        let child = self
            .run_pipeline(Arc::new(step.clone()), key.clone(), config.overlay(), scope)
            .await;

        config.fill(&child.outputs);
        let mut outputs = child.outputs;
        // Declared outputs may reference what the children produced
        for param in &step.outputs {
            if let Err(e) = self.evaluate(param, config) {
                warn!(key = %key, error = %e, "could not evaluate pipeline output");
            }
        }
        outputs.fill(&declared_outputs(step, config));

        let outcome = match (self.inner.options.explain, child.success) {
            (true, _) => StepOutcome::Explained,
            (false, true) => StepOutcome::Succeeded,
            (false, false) => StepOutcome::Failed,
        };
        let mut run = StepRun::new(outcome, None);
        run.reports = child.reports;
        run.errors = child.errors;
        if !self.inner.options.explain {
            let exit_code = if child.success { 0 } else { FAILURE_EXIT_CODE };
            let record = RunRecord::new(child.success, exit_code, outputs);
            run.record = self.persist(key, record, &mut run.errors).await;
        }
        run
    }

    async fn run_nested_loop(
        &self,
        step: &StepDefinition,
        key: &StateKey,
        config: &FlowConfig,
        inherited: &Inherited,
    ) -> StepRun {
        let items = match Self::loop_items(step, config) {
            Ok(items) => items,
            Err(e) => return self.failed(key, e, FAILURE_EXIT_CODE).await,
        };
        info!(key = %key, iterations = items.len(), "running pipeline loop");

        let scope = Self::child_scope(step, config, inherited);
        let pipeline = Arc::new(step.clone());
        let mut run = LoopRun::new();

        for (index, item) in items.iter().enumerate() {
            let iteration_key = key.iteration(index);
            if self.recorded_iteration(&iteration_key, &mut run).await {
                continue;
            }
            if self.inner.cancel.is_cancelled() {
                run.fail(RankflowError::Cancelled {
                    step: iteration_key.to_string(),
                });
                break;
            }

            let mut iteration = match self.iteration_config(step, config, index, item) {
                Ok(iteration) => iteration,
                Err(e) => {
                    run.outputs.push(FlowConfig::new());
                    run.fail(e);
                    continue;
                }
            };
            if let Err(e) = self.loop_scripts(step, &mut iteration).await {
                let _ = self
                    .persist(&iteration_key, RunRecord::failed(FAILURE_EXIT_CODE), &mut run.errors)
                    .await;
                run.outputs.push(FlowConfig::new());
                run.fail(e);
                continue;
            }

            let child = self
                .run_pipeline(pipeline.clone(), iteration_key.clone(), iteration.overlay(), scope.clone())
                .await;
            iteration.fill(&child.outputs);

            let mut outputs = child.outputs;
            outputs.fill(&Self::iteration_outputs(step, &iteration));
            run.status &= child.success;
            run.reports.extend(child.reports);
            run.errors.extend(child.errors);

            if self.inner.options.explain {
                continue;
            }
            let exit_code = if child.success { 0 } else { FAILURE_EXIT_CODE };
            let record = RunRecord::new(child.success, exit_code, outputs);
            run.outputs.push(record.outputs.clone());
            let _ = self.persist(&iteration_key, record, &mut run.errors).await;
        }

        self.finish_loop(step, key, run).await
    }
}

/// Running aggregate of a loop step
struct LoopRun {
    status: bool,
    outputs: Vec<FlowConfig>,
    reports: Vec<StepReport>,
    errors: Vec<RankflowError>,
}

impl LoopRun {
    fn new() -> Self {
        Self {
            status: true,
            outputs: Vec::new(),
            reports: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, error: RankflowError) {
        self.status = false;
        self.errors.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(name: &str, path: &str) -> Volume {
        Volume {
            name: name.into(),
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_volumes_unique_by_name() {
        let inherited = Inherited {
            container: None,
            volumes: vec![volume("data", "/data"), volume("ref", "/ref")],
        };

        let volumes = inherited.with_volumes(vec![volume("ref", "/other/ref"), volume("out", "/out")]);

        assert_eq!(
            volumes,
            vec![volume("data", "/data"), volume("ref", "/other/ref"), volume("out", "/out")]
        );
    }

    #[test]
    fn test_script_error_names_step() {
        let err = script_error(
            "align",
            RankflowError::Script {
                step: String::new(),
                message: "exited with 2".into(),
            },
        );
        assert!(matches!(err, RankflowError::Script { step, .. } if step == "align"));
    }

    #[test]
    fn test_declared_outputs_only() {
        let step = StepDefinition {
            id: "t".into(),
            outputs: vec![Parameter::new("bam", FlowValue::Null)],
            ..Default::default()
        };
        let mut config = FlowConfig::new();
        config.insert("bam", "/out/a.bam");
        config.insert("scratch", "x");

        let outputs = declared_outputs(&step, &config);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get("bam"), Some(&FlowValue::from("/out/a.bam")));
    }
}
