// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Pipeline executor
//!
//! Drives one pipeline level at a time. In rank mode the level is cut into
//! ranks and each rank runs as a set of concurrent workers followed by a
//! barrier. In deferred mode steps are dispatched as soon as the steps they
//! depend on have finished, and anything still blocked is re-checked on a
//! fixed interval. Nested pipelines recurse through the same entry point.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::{DeferredQueue, Recheck};
use super::step::{Dispatch, Inherited, StepRun, StepTask};
use super::transform::Transform;
use super::{ExecutionGraph, PipelineValidator, RankedLevels, StepDefinition};
use crate::checkpoint::{CheckpointGate, CheckpointStore, Decision, RunRecord, StateKey};
use crate::errors::{RankflowError, RankflowResult};
use crate::executors::{ScriptHook, ShellRunner, ShellScriptHook, ToolRunner};
use crate::flow::FlowConfig;
use crate::template::{MustacheRenderer, TemplateRenderer};

/// How the steps of a pipeline level are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStrategy {
    /// Precomputed ranks with a barrier between them
    #[default]
    Rank,
    /// Dispatch on completion, re-check blocked steps on an interval
    Deferred,
}

impl std::fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rank => write!(f, "rank"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// Pipeline execution options
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// First segment of every checkpoint key
    pub namespace: String,
    pub strategy: DispatchStrategy,
    /// Render and log commands without running them or writing checkpoints
    pub explain: bool,
    /// Re-check interval of the deferred queue
    pub poll_interval: Duration,
    /// Re-checks after which a blocked step is reported as stalled
    pub max_rechecks: u32,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            namespace: "rankflow".to_string(),
            strategy: DispatchStrategy::Rank,
            explain: false,
            poll_interval: Duration::from_millis(5000),
            max_rechecks: 120,
        }
    }
}

/// How a single step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed,
    /// Already succeeded in an earlier run
    Skipped,
    /// Not run because a dependency failed
    SkippedFailed,
    /// A script asked to skip the tool
    Impeded,
    /// Explain mode; nothing was run
    Explained,
    /// Dependencies never produced a record
    Stalled,
    Cancelled,
}

impl StepOutcome {
    /// Whether the outcome counts as success for the enclosing pipeline
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Skipped | Self::Impeded | Self::Explained
        )
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::SkippedFailed => "skipped (dependency failed)",
            Self::Impeded => "impeded",
            Self::Explained => "explained",
            Self::Stalled => "stalled",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Progress notifications, sent in order per pipeline level
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted { key: String, pipeline: String, steps: usize },
    RankStarted { key: String, rank: usize, steps: Vec<String> },
    StepDispatched { key: String, step: String },
    StepFinished { key: String, step: String, outcome: StepOutcome },
    PipelineFinished { key: String, pipeline: String, success: bool },
}

/// Summary of one step execution
#[derive(Debug, Clone)]
pub struct StepReport {
    pub key: String,
    pub step: String,
    pub outcome: StepOutcome,
    pub exit_code: Option<i64>,
    pub duration: Duration,
}

/// Result of executing a pipeline
#[derive(Debug)]
pub struct PipelineResult {
    pub instance_id: String,
    /// Aggregate status of the root
    pub success: bool,
    /// Every step report, parents after their children
    pub reports: Vec<StepReport>,
    /// Every error collected during the run
    pub errors: Vec<RankflowError>,
    /// Outputs recorded by the root
    pub outputs: FlowConfig,
    pub duration: Duration,
}

impl PipelineResult {
    /// Turn a failed run into an error carrying everything that went wrong
    pub fn into_result(self) -> RankflowResult<Self> {
        if !self.errors.is_empty() {
            return Err(RankflowError::join(self.errors));
        }
        if !self.success {
            return Err(RankflowError::PipelineFailed {
                pipeline: self.instance_id,
            });
        }
        Ok(self)
    }

    pub fn report(&self, step: &str) -> Option<&StepReport> {
        self.reports.iter().find(|r| r.step == step)
    }
}

/// Aggregated result of one pipeline level
#[derive(Debug, Default)]
pub(super) struct PipelineRun {
    pub(super) success: bool,
    /// Outputs recorded by the level's steps, merged in declaration order
    pub(super) outputs: FlowConfig,
    pub(super) reports: Vec<StepReport>,
    pub(super) errors: Vec<RankflowError>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    fn absorb(&mut self, run: StepRun, config: &mut FlowConfig) {
        self.success &= run.outcome.is_success();
        if let Some(record) = &run.record {
            config.fill(&record.outputs);
            self.outputs.fill(&record.outputs);
        }
        self.reports.extend(run.reports);
        self.errors.extend(run.errors);
    }

    fn fail(&mut self, error: RankflowError) {
        self.success = false;
        self.errors.push(error);
    }
}

pub(super) struct EngineInner {
    pub(super) runner: Arc<dyn ToolRunner>,
    pub(super) scripts: Arc<dyn ScriptHook>,
    pub(super) renderer: Arc<dyn TemplateRenderer>,
    pub(super) gate: CheckpointGate,
    pub(super) transforms: Vec<Transform>,
    pub(super) options: ExecutionOptions,
    pub(super) cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<ExecutionEvent>>,
}

/// Pipeline executor; cheap to clone, clones share the same engine
#[derive(Clone)]
pub struct PipelineExecutor {
    pub(super) inner: Arc<EngineInner>,
}

/// Builder for [`PipelineExecutor`]
pub struct ExecutorBuilder {
    store: Arc<dyn CheckpointStore>,
    runner: Option<Arc<dyn ToolRunner>>,
    scripts: Option<Arc<dyn ScriptHook>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    transforms: Vec<Transform>,
    options: ExecutionOptions,
    cancel: Option<CancellationToken>,
    events: Option<mpsc::UnboundedSender<ExecutionEvent>>,
}

impl ExecutorBuilder {
    pub fn runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn scripts(mut self, scripts: Arc<dyn ScriptHook>) -> Self {
        self.scripts = Some(scripts);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Append a transform; transforms run in the order they were added
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn events(mut self, sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn build(self) -> PipelineExecutor {
        PipelineExecutor {
            inner: Arc::new(EngineInner {
                runner: self.runner.unwrap_or_else(|| Arc::new(ShellRunner::default())),
                scripts: self.scripts.unwrap_or_else(|| Arc::new(ShellScriptHook::default())),
                renderer: self.renderer.unwrap_or_else(|| Arc::new(MustacheRenderer::new())),
                gate: CheckpointGate::new(self.store),
                transforms: self.transforms,
                options: self.options,
                cancel: self.cancel.unwrap_or_default(),
                events: self.events,
            }),
        }
    }
}

impl PipelineExecutor {
    /// Start building an executor over a checkpoint store
    pub fn builder(store: Arc<dyn CheckpointStore>) -> ExecutorBuilder {
        ExecutorBuilder {
            store,
            runner: None,
            scripts: None,
            renderer: None,
            transforms: Vec::new(),
            options: ExecutionOptions::default(),
            cancel: None,
            events: None,
        }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.inner.options
    }

    pub fn gate(&self) -> &CheckpointGate {
        &self.inner.gate
    }

    /// Token that stops further dispatch when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Key under which every record of `instance_id` lives
    pub fn instance_key(&self, instance_id: &str) -> StateKey {
        StateKey::instance(&self.inner.options.namespace, instance_id)
    }

    /// Execute a definition as pipeline instance `instance_id`.
    ///
    /// Construction errors anywhere in the tree are returned as `Err` before
    /// anything runs. Step failures end up in the returned result.
    pub async fn execute(
        &self,
        definition: &StepDefinition,
        config: FlowConfig,
        instance_id: &str,
    ) -> RankflowResult<PipelineResult> {
        let start = Instant::now();
        PipelineValidator::check(definition)?;

        let root = definition.clone().into_pipeline();
        let key = self.instance_key(instance_id).child(&root.id);
        info!(
            pipeline = %root.id,
            instance = %instance_id,
            strategy = %self.inner.options.strategy,
            explain = self.inner.options.explain,
            "starting pipeline"
        );

        let task = StepTask {
            step: root,
            key: key.clone(),
            pipeline_id: instance_id.to_string(),
            config,
            inherited: Inherited::default(),
        };

        let run = match self.run_step(task).await {
            Dispatch::Done(run) => run,
            Dispatch::Deferred(waiting_on) => StepRun::stalled(&key, waiting_on, 1),
        };

        let success = run.outcome.is_success();
        info!(
            pipeline = %key.leaf(),
            success,
            errors = run.errors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "pipeline finished"
        );

        Ok(PipelineResult {
            instance_id: instance_id.to_string(),
            success,
            outputs: run.record.map(|r| r.outputs).unwrap_or_default(),
            reports: run.reports,
            errors: run.errors,
            duration: start.elapsed(),
        })
    }

    /// Remove every checkpoint of an instance
    pub async fn clean(&self, instance_id: &str) -> RankflowResult<bool> {
        let key = self.instance_key(instance_id);
        info!(key = %key, "removing checkpoints");
        self.inner.gate.clean(&key).await
    }

    /// Every record of an instance, ordered by key
    pub async fn records(&self, instance_id: &str) -> RankflowResult<Vec<(StateKey, RunRecord)>> {
        let prefix = self.instance_key(instance_id);
        let store = self.inner.gate.store();
        let mut records = Vec::new();
        for key in store.keys(&prefix).await? {
            if let Some(record) = store.get(&key).await? {
                records.push((key, record));
            }
        }
        Ok(records)
    }

    pub(super) fn emit(&self, event: ExecutionEvent) {
        if let Some(events) = &self.inner.events {
            let _ = events.send(event);
        }
    }

    /// Run the children of `pipeline` below `key`
    pub(super) fn run_pipeline(
        &self,
        pipeline: Arc<StepDefinition>,
        key: StateKey,
        config: FlowConfig,
        inherited: Inherited,
    ) -> BoxFuture<'static, PipelineRun> {
        let this = self.clone();
        Box::pin(async move {
            this.emit(ExecutionEvent::PipelineStarted {
                key: key.to_string(),
                pipeline: pipeline.id.clone(),
                steps: pipeline.steps.len(),
            });

            let run = match this.inner.options.strategy {
                DispatchStrategy::Rank => this.run_ranked(&pipeline, &key, config, &inherited).await,
                DispatchStrategy::Deferred => this.run_deferred(&pipeline, &key, config, &inherited).await,
            };

            this.emit(ExecutionEvent::PipelineFinished {
                key: key.to_string(),
                pipeline: pipeline.id.clone(),
                success: run.success,
            });
            run
        })
    }

    fn task_for(
        &self,
        pipeline: &StepDefinition,
        idx: usize,
        key: &StateKey,
        config: &FlowConfig,
        inherited: &Inherited,
    ) -> StepTask {
        let step = pipeline.steps[idx].clone();
        StepTask {
            key: key.child(&step.id),
            pipeline_id: pipeline.id.clone(),
            config: config.overlay(),
            inherited: inherited.clone(),
            step,
        }
    }

    fn cancelled_run(&self, key: &StateKey, step: &str) -> StepRun {
        StepRun::cancelled(&key.child(step))
    }

    async fn run_ranked(
        &self,
        pipeline: &Arc<StepDefinition>,
        key: &StateKey,
        config: FlowConfig,
        inherited: &Inherited,
    ) -> PipelineRun {
        let mut run = PipelineRun::new();
        let mut config = config;

        let levels = match ExecutionGraph::build(pipeline).and_then(|g| RankedLevels::compute(&g)) {
            Ok(levels) => levels,
            Err(e) => {
                run.fail(e);
                return run;
            }
        };

        for (rank, level) in levels.iter().enumerate() {
            let ids: Vec<String> = level.iter().map(|idx| pipeline.steps[*idx].id.clone()).collect();
            debug!(key = %key, rank, steps = ?ids, "dispatching rank");
            self.emit(ExecutionEvent::RankStarted {
                key: key.to_string(),
                rank,
                steps: ids,
            });

            let mut workers = JoinSet::new();
            let mut finished: BTreeMap<usize, StepRun> = BTreeMap::new();

            for idx in level {
                if self.inner.cancel.is_cancelled() {
                    finished.insert(*idx, self.cancelled_run(key, &pipeline.steps[*idx].id));
                    continue;
                }
                let task = self.task_for(pipeline, *idx, key, &config, inherited);
                let this = self.clone();
                let idx = *idx;
                workers.spawn(async move { (idx, this.run_step(task).await) });
            }

            // Barrier: every worker of the rank finishes before the next rank starts
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok((idx, Dispatch::Done(step_run))) => {
                        finished.insert(idx, step_run);
                    }
                    Ok((idx, Dispatch::Deferred(waiting_on))) => {
                        let step_key = key.child(&pipeline.steps[idx].id);
                        warn!(key = %step_key, waiting_on = ?waiting_on, "dependencies missing after barrier");
                        finished.insert(idx, StepRun::stalled(&step_key, waiting_on, 1));
                    }
                    Err(e) => warn!(key = %key, error = %e, "step worker aborted"),
                }
            }

            for idx in level {
                match finished.remove(idx) {
                    Some(step_run) => run.absorb(step_run, &mut config),
                    None => run.fail(RankflowError::ToolExecution {
                        step: pipeline.steps[*idx].id.clone(),
                        message: "step worker aborted".to_string(),
                    }),
                }
            }
        }

        run
    }

    async fn run_deferred(
        &self,
        pipeline: &Arc<StepDefinition>,
        key: &StateKey,
        config: FlowConfig,
        inherited: &Inherited,
    ) -> PipelineRun {
        let mut run = PipelineRun::new();
        let mut config = config;

        let graph = match ExecutionGraph::build(pipeline) {
            Ok(graph) => graph,
            Err(e) => {
                run.fail(e);
                return run;
            }
        };

        let options = &self.inner.options;
        let mut queue = DeferredQueue::new(options.max_rechecks);
        let mut dispatched: HashSet<usize> = HashSet::new();
        let mut workers: JoinSet<(usize, Dispatch)> = JoinSet::new();
        let mut finished: BTreeMap<usize, StepRun> = BTreeMap::new();

        for (idx, step) in pipeline.steps.iter().enumerate() {
            if step.depends.is_empty() {
                self.spawn_step(&mut workers, &mut dispatched, pipeline, idx, key, &config, inherited);
            } else {
                queue.defer(idx, step.depends.clone());
            }
        }

        let mut ticker = tokio::time::interval(options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            if workers.is_empty() && queue.is_empty() {
                break;
            }

            if self.inner.cancel.is_cancelled() && !queue.is_empty() {
                for (idx, _) in queue.drain() {
                    finished.insert(idx, self.cancelled_run(key, &pipeline.steps[idx].id));
                }
                continue;
            }

            tokio::select! {
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    let (idx, dispatch) = match joined {
                        Ok(done) => done,
                        Err(e) => {
                            warn!(key = %key, error = %e, "step worker aborted");
                            continue;
                        }
                    };

                    match dispatch {
                        Dispatch::Done(step_run) => {
                            if let Some(record) = &step_run.record {
                                config.fill(&record.outputs);
                            }
                            finished.insert(idx, step_run);
                        }
                        Dispatch::Deferred(waiting_on) => {
                            dispatched.remove(&idx);
                            queue.defer(idx, waiting_on);
                            continue;
                        }
                    }

                    // Push-driven: look at the dependents of the step that just finished
                    let dependents = graph.dependents(&pipeline.steps[idx].id).unwrap_or_default();
                    for dependent in dependents {
                        let Some(dep_idx) = graph.index_of(&dependent) else { continue };
                        if queue.contains(dep_idx) {
                            self.try_dispatch(&mut queue, &mut workers, &mut dispatched, &mut finished, pipeline, dep_idx, key, &config, inherited, false).await;
                        }
                    }
                }
                _ = ticker.tick() => {
                    for idx in queue.pending() {
                        self.try_dispatch(&mut queue, &mut workers, &mut dispatched, &mut finished, pipeline, idx, key, &config, inherited, true).await;
                    }
                }
            }
        }

        // Level outputs are merged in declaration order, not completion order
        let mut merged = FlowConfig::new();
        for (idx, step) in pipeline.steps.iter().enumerate() {
            match finished.remove(&idx) {
                Some(step_run) => run.absorb(step_run, &mut merged),
                None => run.fail(RankflowError::ToolExecution {
                    step: step.id.clone(),
                    message: "step worker aborted".to_string(),
                }),
            }
        }
        run
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_step(
        &self,
        workers: &mut JoinSet<(usize, Dispatch)>,
        dispatched: &mut HashSet<usize>,
        pipeline: &StepDefinition,
        idx: usize,
        key: &StateKey,
        config: &FlowConfig,
        inherited: &Inherited,
    ) {
        if !dispatched.insert(idx) {
            return;
        }
        let task = self.task_for(pipeline, idx, key, config, inherited);
        let this = self.clone();
        workers.spawn(async move { (idx, this.run_step(task).await) });
    }

    /// Classify a parked step and dispatch it once it is no longer blocked
    #[allow(clippy::too_many_arguments)]
    async fn try_dispatch(
        &self,
        queue: &mut DeferredQueue,
        workers: &mut JoinSet<(usize, Dispatch)>,
        dispatched: &mut HashSet<usize>,
        finished: &mut BTreeMap<usize, StepRun>,
        pipeline: &StepDefinition,
        idx: usize,
        key: &StateKey,
        config: &FlowConfig,
        inherited: &Inherited,
        count_check: bool,
    ) {
        let step = &pipeline.steps[idx];
        let step_key = key.child(&step.id);

        if self.inner.cancel.is_cancelled() {
            queue.remove(idx);
            finished.insert(idx, StepRun::cancelled(&step_key));
            return;
        }

        let decision = match self.inner.gate.classify(&step_key, &step.depends).await {
            Ok(decision) => decision,
            Err(e) => {
                queue.remove(idx);
                finished.insert(idx, StepRun::errored(&step_key, e));
                return;
            }
        };

        match decision {
            // A dependency that is running or still parked is not stuck yet
            Decision::Defer { waiting_on } if count_check && Self::settled(pipeline, finished, &waiting_on) => {
                if let Recheck::Stalled { attempts, waiting_on } = queue.still_waiting(idx, waiting_on) {
                    warn!(key = %step_key, attempts, waiting_on = ?waiting_on, "giving up on step");
                    let mut stalled = StepRun::stalled(&step_key, waiting_on, attempts);
                    if let Err(e) = self.inner.gate.record(&step_key, &RunRecord::failed(1)).await {
                        stalled.errors.push(e);
                    }
                    finished.insert(idx, stalled);
                }
            }
            Decision::Defer { waiting_on } => queue.defer(idx, waiting_on),
            _ => {
                queue.remove(idx);
                self.spawn_step(workers, dispatched, pipeline, idx, key, config, inherited);
            }
        }
    }

    /// Whether every dependency in `waiting_on` has finished in this level
    fn settled(pipeline: &StepDefinition, finished: &BTreeMap<usize, StepRun>, waiting_on: &[String]) -> bool {
        waiting_on.iter().all(|dependency| {
            pipeline
                .steps
                .iter()
                .position(|step| &step.id == dependency)
                .map_or(true, |idx| finished.contains_key(&idx))
        })
    }
}
