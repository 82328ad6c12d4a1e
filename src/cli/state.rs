// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! State command - inspect or clear checkpoints of a pipeline instance

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::StateAction;
use crate::checkpoint::{CheckpointGate, FilesystemStore, StateKey};
use crate::settings::Settings;
use crate::utils::print_info;

/// Run the state command
pub async fn run(action: StateAction, settings_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let settings = Settings::load(settings_path.as_deref())?;
    let state_dir = settings.resolve_state_dir();
    let gate = CheckpointGate::new(Arc::new(FilesystemStore::new(state_dir.clone())?));

    match action {
        StateAction::Show { pipeline, instance } => {
            let prefix = instance_key(&settings, &pipeline, instance)?;
            let keys = gate.store().keys(&prefix).await?;
            if keys.is_empty() {
                println!("No checkpoints for {}", prefix.to_string().cyan());
                return Ok(());
            }

            println!("{} ({} records)", prefix.to_string().bold(), keys.len());
            for key in keys {
                let Some(record) = gate.lookup(&key).await? else {
                    continue;
                };
                let relative = key.segments()[prefix.depth()..].join("/");
                let marker = match record.status {
                    Some(true) => "✓".green(),
                    Some(false) => "✗".red(),
                    None => "?".dimmed(),
                };
                println!("  {} {} {}", marker, relative, format!("exit {}", record.exit_code).dimmed());
                if verbose {
                    for (name, value) in record.outputs.iter() {
                        println!("      {} = {}", name.cyan(), value);
                    }
                }
            }
            if verbose {
                print_info(&format!("state directory: {}", state_dir.display()));
            }
        }
        StateAction::Clear { pipeline, instance } => {
            let prefix = instance_key(&settings, &pipeline, instance)?;
            if gate.clean(&prefix).await? {
                println!("{} {}", "Removed checkpoints of".green(), prefix.to_string().cyan());
            } else {
                println!("No checkpoints for {}", prefix.to_string().cyan());
            }
        }
    }

    Ok(())
}

/// Key of an instance; without `--instance`, the default fingerprint with no parameters
fn instance_key(settings: &Settings, pipeline: &Path, instance: Option<String>) -> Result<StateKey> {
    let params = crate::flow::FlowConfig::new();
    let id = super::resolve_instance(pipeline, &params, instance)?;
    Ok(StateKey::instance(&settings.namespace, &id))
}
