// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for rankflow.

pub mod graph;
pub mod run;
pub mod state;
pub mod validate;

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::Result;
use std::path::{Path, PathBuf};

use crate::checkpoint::instance_id;
use crate::flow::{FlowConfig, FlowValue};
use crate::pipeline::{DispatchStrategy, StepDefinition};

/// Workflow DAG runner with resumable checkpoints
#[derive(Parser, Debug)]
#[clap(
    name = "rankflow",
    version,
    about = "Run pipelines of tools as a dependency graph, resuming from checkpoints",
    long_about = None,
    after_help = "Examples:\n\
        rankflow validate pipeline.yaml              Check a definition\n\
        rankflow graph pipeline.yaml -f mermaid      Show the step graph\n\
        rankflow run pipeline.yaml --set sample=s1   Execute, resuming earlier runs\n\
        rankflow state show pipeline.yaml            List recorded steps\n\n\
        See 'rankflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Settings file (default: rankflow.toml if present)
    #[clap(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a pipeline
    Run(RunArgs),

    /// Validate a pipeline definition
    Validate {
        /// Pipeline definition
        pipeline: PathBuf,
    },

    /// Show a pipeline as a graph
    Graph {
        /// Pipeline definition
        pipeline: PathBuf,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// Inspect or clear recorded checkpoints
    State {
        #[clap(subcommand)]
        action: StateAction,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Pipeline definition (YAML or JSON)
    pub pipeline: PathBuf,

    /// Pipeline instance id (default: fingerprint of definition and parameters)
    #[clap(short, long)]
    pub instance: Option<String>,

    /// Dispatch strategy
    #[clap(short, long, value_enum)]
    pub strategy: Option<DispatchStrategy>,

    /// Set a parameter, e.g. --set sample=s1
    #[clap(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// YAML or JSON file with parameters
    #[clap(short, long, value_name = "FILE")]
    pub params: Option<PathBuf>,

    /// Render and print commands without running anything
    #[clap(long)]
    pub explain: bool,

    /// Remove the instance's checkpoints before running
    #[clap(long)]
    pub fresh: bool,
}

/// Checkpoint actions
#[derive(Subcommand, Debug, Clone)]
pub enum StateAction {
    /// List the records of an instance
    Show {
        pipeline: PathBuf,

        #[clap(short, long)]
        instance: Option<String>,
    },

    /// Remove every record of an instance
    Clear {
        pipeline: PathBuf,

        #[clap(short, long)]
        instance: Option<String>,
    },
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Load a definition, turning a missing file into a friendly error
pub fn load_definition(path: &Path) -> Result<StepDefinition> {
    if !path.exists() {
        return Err(miette::miette!(
            "Pipeline definition not found: {}\n\n\
             Pass the path of a YAML or JSON definition.",
            path.display()
        ));
    }
    Ok(StepDefinition::from_file(path)?)
}

/// Split `key=value`, parsing the value like a YAML scalar
pub fn parse_assignment(assignment: &str) -> Result<(String, FlowValue)> {
    match assignment.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), FlowValue::parse_literal(value.trim())))
        }
        _ => Err(miette::miette!(
            "Invalid parameter '{}', expected KEY=VALUE",
            assignment
        )),
    }
}

/// Parameters from `--params FILE` overridden by `--set` assignments
pub fn load_params(file: Option<&Path>, assignments: &[String]) -> Result<FlowConfig> {
    let mut params = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| miette::miette!("Failed to read '{}': {}", path.display(), e))?;
            let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
            if is_json {
                serde_json::from_str::<FlowConfig>(&content).map_err(crate::errors::RankflowError::from)?
            } else {
                serde_yaml::from_str::<FlowConfig>(&content).map_err(crate::errors::RankflowError::from)?
            }
        }
        None => FlowConfig::new(),
    };

    for assignment in assignments {
        let (key, value) = parse_assignment(assignment)?;
        params.insert(key, value);
    }
    Ok(params)
}

/// Explicit instance id, or the fingerprint of definition and parameters
pub fn resolve_instance(pipeline: &Path, params: &FlowConfig, explicit: Option<String>) -> Result<String> {
    match explicit {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Ok(instance_id(pipeline, params)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let (key, value) = parse_assignment("threads = 4").unwrap();
        assert_eq!(key, "threads");
        assert_eq!(value, FlowValue::Integer(4));

        let (_, value) = parse_assignment("ref=/data/hg38.fa").unwrap();
        assert_eq!(value, FlowValue::from("/data/hg38.fa"));

        assert!(parse_assignment("=3").is_err());
        assert!(parse_assignment("novalue").is_err());
    }

    #[test]
    fn test_set_overrides_params_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("params.yaml");
        std::fs::write(&path, "sample: s1\nsamples: [a, b]\n").unwrap();

        let params = load_params(Some(&path), &["sample=s2".to_string()]).unwrap();
        assert_eq!(params.get("sample"), Some(&FlowValue::from("s2")));
        assert!(matches!(params.get("samples"), Some(FlowValue::List(items)) if items.len() == 2));
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::parse_from([
            "rankflow", "run", "p.yaml", "--strategy", "deferred", "--set", "a=1", "--explain",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.strategy, Some(DispatchStrategy::Deferred));
                assert_eq!(args.set, vec!["a=1".to_string()]);
                assert!(args.explain);
                assert!(!args.fresh);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
