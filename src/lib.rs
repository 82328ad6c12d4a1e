// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! # rankflow - resumable workflow DAG runner
//!
//! `rankflow` runs pipelines of tools and nested pipelines as a dependency
//! graph. Every step result is checkpointed, so re-running an instance skips
//! what already succeeded and resumes where it stopped.
//!
//! ## Features
//!
//! - **Ranked execution** - steps of a rank run concurrently, ranks in order
//! - **Deferred dispatch** - steps start as soon as their dependencies finish
//! - **Checkpoints** - filesystem or in-memory, keyed per pipeline instance
//! - **Loops and nesting** - iterate a tool or a whole pipeline over a list
//!
//! ## Quick Start
//!
//! ```bash
//! # Check a definition and list its inputs
//! rankflow validate pipeline.yaml
//!
//! # Run it; a second run resumes
//! rankflow run pipeline.yaml --set sample=s1
//!
//! # Inspect what was recorded
//! rankflow state show pipeline.yaml
//! ```

pub mod checkpoint;
pub mod cli;
pub mod coordination;
pub mod errors;
pub mod executors;
pub mod flow;
pub mod pipeline;
pub mod settings;
pub mod template;
pub mod utils;

// Re-export commonly used types
pub use checkpoint::{CheckpointGate, CheckpointStore, FilesystemStore, MemoryStore, RunRecord, StateKey};
pub use errors::{RankflowError, RankflowResult};
pub use flow::{FlowConfig, FlowValue};
pub use pipeline::{
    DispatchStrategy, ExecutionGraph, ExecutionOptions, PipelineExecutor, PipelineResult, RankedLevels,
    StepDefinition,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
