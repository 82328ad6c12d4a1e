// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Progress display for running pipelines

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc;

use super::colors::outcome_marker;
use crate::pipeline::{ExecutionEvent, StepOutcome};

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Counts step outcomes while printing one line per finished step
#[derive(Debug, Default)]
pub struct RunProgress {
    running: Vec<String>,
    finished: usize,
    failed: usize,
    skipped: usize,
}

impl RunProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line for a finished step, if one should be printed
    pub fn observe(&mut self, event: &ExecutionEvent) -> Option<String> {
        match event {
            ExecutionEvent::StepDispatched { step, .. } => {
                self.running.push(step.clone());
                None
            }
            ExecutionEvent::StepFinished { key, step, outcome } => {
                if let Some(pos) = self.running.iter().position(|s| s == step) {
                    self.running.remove(pos);
                }
                self.finished += 1;
                match outcome {
                    StepOutcome::Skipped | StepOutcome::SkippedFailed => self.skipped += 1,
                    o if !o.is_success() => self.failed += 1,
                    _ => {}
                }
                let detail = match outcome {
                    StepOutcome::Succeeded => String::new(),
                    other => format!(" ({})", other),
                };
                Some(format!("  {} {}{}", outcome_marker(*outcome), key, detail.dimmed()))
            }
            _ => None,
        }
    }

    /// Spinner message
    pub fn message(&self) -> String {
        match self.running.as_slice() {
            [] => format!("{} steps finished", self.finished),
            [one] => format!("Running {}", one),
            [first, rest @ ..] => format!("Running {} and {} more", first, rest.len()),
        }
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Drive a spinner from engine events until the sender side is dropped
    pub async fn follow(mut self, mut events: mpsc::UnboundedReceiver<ExecutionEvent>, spinner: ProgressBar) -> Self {
        while let Some(event) = events.recv().await {
            if let Some(line) = self.observe(&event) {
                spinner.println(line);
            }
            spinner.set_message(self.message());
        }
        self
    }
}
