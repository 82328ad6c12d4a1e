// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Validate command - check a pipeline definition

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{PipelineValidator, StepDefinition};

/// Run the validate command
pub async fn run(pipeline_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let definition = match super::load_definition(&pipeline_path) {
        Ok(definition) => definition,
        Err(e) => {
            eprintln!("  {} Failed to parse definition", "✗".red());
            eprintln!();
            return Err(e);
        }
    };
    println!("  {} Definition parsed", "✓".green());

    let validation = PipelineValidator::validate(&definition);

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    let requirements = PipelineValidator::input_requirements(&definition);
    if !requirements.is_empty() {
        println!();
        println!("{}:", "Inputs".bold());
        for input in &requirements {
            let default = if input.has_default { " (has default)" } else { "" };
            let description = if input.description.is_empty() {
                String::new()
            } else {
                format!(" - {}", input.description)
            };
            println!(
                "  {} {}{}{}",
                input.step.dimmed(),
                input.name.cyan(),
                description,
                default.dimmed()
            );
        }
    }

    if verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        print_tree(&definition, 1);
    }

    println!();
    if !validation.is_valid() {
        return Err(miette::miette!("Pipeline validation failed"));
    }
    if validation.has_warnings() {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
    }
    Ok(())
}

fn print_tree(step: &StepDefinition, depth: usize) {
    let deps = if step.depends.is_empty() {
        String::new()
    } else {
        format!(" [depends: {}]", step.depends.join(", "))
    };
    let looped = match (&step.is_loop, &step.loop_var) {
        (true, Some(var)) => format!(" [loop: {}]", var),
        _ => String::new(),
    };
    println!(
        "{}- {} ({}){}{}",
        "  ".repeat(depth),
        step.display_name(),
        step.kind(),
        deps.dimmed(),
        looped.dimmed()
    );
    for child in &step.steps {
        print_tree(child, depth + 1);
    }
}
