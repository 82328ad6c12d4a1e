// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Shared fixtures: a scripted tool runner, a recording script hook and a
//! store that can be told to lose writes.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rankflow::checkpoint::{CheckpointStore, MemoryStore, RunRecord, StateKey};
use rankflow::executors::{ScriptHook, ToolInstance, ToolRunner};
use rankflow::flow::{FlowConfig, FlowValue, EXIT_CODE_KEY, IMPEDE_KEY, STATUS_KEY};
use rankflow::pipeline::{DispatchStrategy, ExecutionOptions, PipelineExecutor, Script, StepDefinition};
use rankflow::{RankflowError, RankflowResult};

/// One invocation seen by [`ScriptedRunner`]
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: ToolInstance,
    pub config: FlowConfig,
}

/// Tool runner driven by per-step rules instead of processes.
///
/// Rules are keyed by step id, or by `step#index` for a single loop iteration.
#[derive(Default)]
pub struct ScriptedRunner {
    failures: HashSet<String>,
    errors: HashSet<String>,
    outputs: HashMap<String, Vec<(String, FlowValue)>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<ToolCall>>,
    timeline: Mutex<Vec<(&'static str, String)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with code 1
    pub fn fail(mut self, rule: &str) -> Self {
        self.failures.insert(rule.to_string());
        self
    }

    /// Return a runner error instead of a result
    pub fn error(mut self, rule: &str) -> Self {
        self.errors.insert(rule.to_string());
        self
    }

    pub fn output(mut self, rule: &str, key: &str, value: impl Into<FlowValue>) -> Self {
        self.outputs
            .entry(rule.to_string())
            .or_default()
            .push((key.to_string(), value.into()));
        self
    }

    pub fn delay(mut self, rule: &str, millis: u64) -> Self {
        self.delays.insert(rule.to_string(), Duration::from_millis(millis));
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, step: &str) -> Vec<ToolCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.tool.step_id == step)
            .collect()
    }

    /// Step ids in invocation order
    pub fn invoked(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.tool.step_id).collect()
    }

    /// `("start" | "end", step)` events in order
    pub fn timeline(&self) -> Vec<(&'static str, String)> {
        self.timeline.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str, step: &str) -> usize {
        self.timeline()
            .iter()
            .position(|(e, s)| *e == event && s == step)
            .unwrap_or_else(|| panic!("no {} event for {}", event, step))
    }

    /// Highest number of tools that ran at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn matches(&self, set: &HashSet<String>, tool: &ToolInstance) -> bool {
        rules_for(tool).iter().any(|rule| set.contains(rule))
    }
}

fn rules_for(tool: &ToolInstance) -> Vec<String> {
    let mut rules = vec![tool.step_id.clone()];
    if let Some(index) = tool.loop_index {
        rules.push(format!("{}#{}", tool.step_id, index));
    }
    rules
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, tool: &ToolInstance, config: FlowConfig) -> RankflowResult<FlowConfig> {
        self.calls.lock().unwrap().push(ToolCall {
            tool: tool.clone(),
            config: config.clone(),
        });
        self.timeline.lock().unwrap().push(("start", tool.step_id.clone()));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let delay = rules_for(tool).iter().find_map(|r| self.delays.get(r).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.timeline.lock().unwrap().push(("end", tool.step_id.clone()));

        if self.matches(&self.errors, tool) {
            return Err(RankflowError::ToolExecution {
                step: tool.step_id.clone(),
                message: "runner unavailable".to_string(),
            });
        }

        let failed = self.matches(&self.failures, tool);
        let mut result = config;
        result.insert(STATUS_KEY, !failed);
        result.insert(EXIT_CODE_KEY, if failed { 1 } else { 0 });
        for rule in rules_for(tool) {
            for (key, value) in self.outputs.get(&rule).into_iter().flatten() {
                result.insert(key.clone(), value.clone());
            }
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Script hook interpreting a tiny command language in `code`:
/// `impede`, `fail`, `set key=value`; anything else is only recorded.
#[derive(Default)]
pub struct RecordingHook {
    seen: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(phase, code)` in execution order
    pub fn seen(&self) -> Vec<(&'static str, String)> {
        self.seen.lock().unwrap().clone()
    }

    fn apply(&self, phase: &'static str, script: &Script, config: &mut FlowConfig) -> RankflowResult<()> {
        let code = script.code.clone().unwrap_or_default();
        self.seen.lock().unwrap().push((phase, code.clone()));

        match code.trim() {
            "impede" => {
                config.insert(IMPEDE_KEY, true);
            }
            "fail" => {
                return Err(RankflowError::Script {
                    step: String::new(),
                    message: "script asked to fail".to_string(),
                })
            }
            other => {
                if let Some((key, value)) = other.strip_prefix("set ").and_then(|a| a.split_once('=')) {
                    config.insert(key.trim(), FlowValue::parse_literal(value.trim()));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ScriptHook for RecordingHook {
    async fn run_before(&self, script: &Script, config: &mut FlowConfig) -> RankflowResult<()> {
        self.apply("before", script, config)
    }

    async fn run_after(&self, script: &Script, config: &mut FlowConfig) -> RankflowResult<()> {
        self.apply("after", script, config)
    }

    async fn run_in_loop(&self, script: &Script, config: &mut FlowConfig) -> RankflowResult<()> {
        self.apply("inloop", script, config)
    }
}

/// Memory store that loses writes for some key leaves, silently or with an error
pub struct ForgetfulStore {
    inner: MemoryStore,
    forget: HashSet<String>,
    loud: bool,
}

impl ForgetfulStore {
    pub fn new(forget: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            forget: forget.iter().map(|s| s.to_string()).collect(),
            loud: false,
        })
    }

    /// Writes to `forget` fail with a checkpoint error
    pub fn failing(forget: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            forget: forget.iter().map(|s| s.to_string()).collect(),
            loud: true,
        })
    }
}

#[async_trait]
impl CheckpointStore for ForgetfulStore {
    async fn get(&self, key: &StateKey) -> RankflowResult<Option<RunRecord>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &StateKey, record: &RunRecord) -> RankflowResult<()> {
        if self.forget.contains(key.leaf()) {
            if self.loud {
                return Err(RankflowError::Checkpoint {
                    key: key.to_string(),
                    message: "disk full".to_string(),
                });
            }
            return Ok(());
        }
        self.inner.set(key, record).await
    }

    async fn remove(&self, prefix: &StateKey) -> RankflowResult<bool> {
        self.inner.remove(prefix).await
    }

    async fn keys(&self, prefix: &StateKey) -> RankflowResult<Vec<StateKey>> {
        self.inner.keys(prefix).await
    }

    fn name(&self) -> &str {
        "forgetful"
    }
}

pub const INSTANCE: &str = "run-1";

pub fn options(strategy: DispatchStrategy) -> ExecutionOptions {
    ExecutionOptions {
        strategy,
        poll_interval: Duration::from_millis(10),
        max_rechecks: 5,
        ..Default::default()
    }
}

pub fn executor(
    store: Arc<dyn CheckpointStore>,
    runner: Arc<ScriptedRunner>,
    hook: Arc<RecordingHook>,
    strategy: DispatchStrategy,
) -> PipelineExecutor {
    PipelineExecutor::builder(store)
        .runner(runner)
        .scripts(hook)
        .options(options(strategy))
        .build()
}

pub fn parse(yaml: &str) -> StepDefinition {
    StepDefinition::from_yaml(yaml).expect("valid definition")
}

/// Key of the root pipeline `p`
pub fn root_key() -> StateKey {
    StateKey::instance("rankflow", INSTANCE).child("p")
}

/// Key of a step below the root pipeline, e.g. `inner/x` or `align/1`
pub fn step_key(path: &str) -> StateKey {
    let mut key = root_key();
    for segment in path.split('/') {
        key = key.child(segment);
    }
    key
}

/// a -> (b, c) -> d
pub const DIAMOND: &str = r#"
type: pipeline
id: p
steps:
  - id: a
    command: "echo a"
  - id: b
    depends: a
    command: "echo b"
  - id: c
    depends: a
    command: "echo c"
  - id: d
    depends: b,c
    command: "echo d"
"#;
