// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Run command - execute a pipeline

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::RunArgs;
use crate::checkpoint::FilesystemStore;
use crate::coordination::{Coordinator, StaticCoordinator};
use crate::executors::{ShellRunner, ShellScriptHook};
use crate::pipeline::transform::override_registry;
use crate::pipeline::{
    ExecutionGraph, ExecutionOptions, PipelineExecutor, PipelineResult, PipelineValidator, RankedLevels,
    StepDefinition, StepOutcome,
};
use crate::settings::Settings;
use crate::utils::{create_spinner, format_duration, outcome_marker, print_error, print_header, print_warning, RunProgress};

/// Run the pipeline
pub async fn run(args: RunArgs, settings_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let settings = Settings::load(settings_path.as_deref())?;
    let definition = super::load_definition(&args.pipeline)?;

    let validation = PipelineValidator::validate(&definition);
    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Pipeline definition is invalid"));
    }
    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let params = super::load_params(args.params.as_deref(), &args.set)?;
    let instance = super::resolve_instance(&args.pipeline, &params, args.instance.clone())?;
    let mut config = settings.seed();
    config.fill(&params);

    let coordinator = StaticCoordinator::from_settings(&settings);
    let mode = coordinator.execution_mode().await?;
    let mut options = settings.execution_options(mode);
    if let Some(strategy) = args.strategy {
        options.strategy = strategy;
    }
    options.explain = args.explain;
    debug!(mode = %mode, coordinator = coordinator.name(), strategy = %options.strategy, "execution mode");

    let store = FilesystemStore::new(settings.resolve_state_dir())?;
    let (events, receiver) = mpsc::unbounded_channel();
    let mut builder = PipelineExecutor::builder(Arc::new(store))
        .runner(Arc::new(ShellRunner::new(
            settings.runner.shell.clone(),
            settings.runner.container_engine.clone(),
        )))
        .scripts(Arc::new(ShellScriptHook::new(settings.runner.shell.clone())))
        .options(options.clone())
        .events(events);
    if let Some(registry) = &settings.registry {
        builder = builder.transform(override_registry(registry.clone()));
    }
    let executor = builder.build();

    if args.fresh && !args.explain {
        if executor.clean(&instance).await? {
            println!("  {} Removed checkpoints of {}", "→".blue(), instance.cyan());
        }
    }

    print_execution_plan(&definition, &instance, &options)?;

    let token = executor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, waiting for running steps to finish");
            token.cancel();
        }
    });

    let spinner = create_spinner("Starting pipeline...");
    let progress = tokio::spawn(RunProgress::new().follow(receiver, spinner.clone()));

    let outcome = executor.execute(&definition, config, &instance).await;
    // Closing the last sender ends the progress task
    drop(executor);
    let progress = progress.await.unwrap_or_default();
    spinner.finish_and_clear();

    let result = outcome?;
    print_summary(&result, &progress);
    result.into_result()?;
    Ok(())
}

fn print_execution_plan(definition: &StepDefinition, instance: &str, options: &ExecutionOptions) -> Result<()> {
    let root = definition.clone().into_pipeline();
    let graph = ExecutionGraph::build(&root)?;
    let levels = RankedLevels::compute(&graph)?;

    println!();
    print_header(&format!("Pipeline: {}", root.display_name()));
    println!("  Instance: {}", instance.cyan());
    println!("  Strategy: {}", options.strategy);
    if options.explain {
        println!("  {}", "Explain mode: nothing will be executed".yellow());
    }
    println!();
    println!("Execution plan ({} ranks):", levels.len());
    for (rank, ids) in levels.ids(&graph).iter().enumerate() {
        println!("  {}. {}", rank + 1, ids.join(", "));
    }
    println!();
    Ok(())
}

fn print_summary(result: &PipelineResult, progress: &RunProgress) {
    println!();
    for report in &result.reports {
        if report.outcome == StepOutcome::Succeeded {
            continue;
        }
        let exit = report
            .exit_code
            .map(|code| format!(" exit {}", code))
            .unwrap_or_default();
        println!("  {} {} ({}{})", outcome_marker(report.outcome), report.key, report.outcome, exit.dimmed());
    }

    for error in &result.errors {
        print_error(&error.to_string());
    }
    if progress.skipped() > 0 {
        print_warning(&format!("{} steps skipped", progress.skipped()));
    }

    println!();
    if result.success {
        println!(
            "{}",
            format!("Pipeline completed successfully in {}", format_duration(result.duration))
                .green()
                .bold()
        );
    } else {
        println!(
            "{}",
            format!("Pipeline failed after {}", format_duration(result.duration))
                .red()
                .bold()
        );
    }
}
