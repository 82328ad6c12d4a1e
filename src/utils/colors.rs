// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::{ColoredString, Colorize};
use std::time::Duration;

use crate::pipeline::StepOutcome;

/// Marker printed in front of a step line
pub fn outcome_marker(outcome: StepOutcome) -> ColoredString {
    match outcome {
        StepOutcome::Succeeded => "✓".green(),
        StepOutcome::Failed => "✗".red(),
        StepOutcome::Skipped => "○".dimmed(),
        StepOutcome::SkippedFailed => "○".yellow(),
        StepOutcome::Impeded | StepOutcome::Explained => "→".blue(),
        StepOutcome::Stalled => "⚠".yellow(),
        StepOutcome::Cancelled => "✗".yellow(),
    }
}

/// `1.23s` below a minute, `2m05s` above
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        let whole = duration.as_secs();
        format!("{}m{:02}s", whole / 60, whole % 60)
    }
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.chars().count().max(40)));
}

/// Print a styled section
pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}

/// Print a success check
pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

/// Print an error cross
pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}

/// Print an info item
pub fn print_info(msg: &str) {
    println!("  {} {}", "→".blue(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.23s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }
}
