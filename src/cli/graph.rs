// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Graph command - print the top-level step graph

use miette::Result;
use std::path::PathBuf;

use super::GraphFormat;
use crate::pipeline::ExecutionGraph;

/// Run the graph command
pub async fn run(pipeline_path: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    let definition = super::load_definition(&pipeline_path)?.into_pipeline();
    let graph = ExecutionGraph::build(&definition)?;

    let output = match format {
        GraphFormat::Text => graph.to_text(&definition.steps)?,
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    };

    println!("{}", output);
    Ok(())
}
