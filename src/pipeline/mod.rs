// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Pipeline definitions, graph construction and execution
//!
//! A definition is a tree of steps. Each pipeline level is turned into an
//! [`ExecutionGraph`], leveled into [`RankedLevels`] and executed by the
//! [`PipelineExecutor`], which recurses into nested pipelines.

mod dag;
mod definition;
mod executor;
mod levels;
mod queue;
mod step;
pub mod transform;
mod validation;

pub use dag::ExecutionGraph;
pub use definition::*;
pub use executor::{
    DispatchStrategy, ExecutionEvent, ExecutionOptions, ExecutorBuilder, PipelineExecutor, PipelineResult,
    StepOutcome, StepReport,
};
pub use levels::RankedLevels;
pub use queue::{DeferredQueue, Recheck};
pub use transform::Transform;
pub use validation::{InputRequirement, PipelineValidator, ValidationResult};
