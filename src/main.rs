// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! rankflow - resumable workflow DAG runner

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rankflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "rankflow=debug" } else { "rankflow=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    match cli.command {
        Commands::Run(args) => rankflow::cli::run::run(args, cli.settings, cli.verbose).await,
        Commands::Validate { pipeline } => rankflow::cli::validate::run(pipeline, cli.verbose).await,
        Commands::Graph { pipeline, format } => {
            rankflow::cli::graph::run(pipeline, format, cli.verbose).await
        }
        Commands::State { action } => rankflow::cli::state::run(action, cli.settings, cli.verbose).await,
    }
}
