//! Output formatting - ASCII-only terminal output
//!
//! One line per Setting, then a summary. `--json` bypasses all of this and
//! prints the report as serialized.

use anyhow::Result;
use d3guard_common::recovery::{RecoveryRun, RecoveryState};
use d3guard_common::report::{Action, Entry};
use d3guard_common::{ProbeState, RunReport, Severity};
use owo_colors::OwoColorize;
use serde::Serialize;

/// Marker printed in front of an entry
pub fn marker(entry: &Entry) -> &'static str {
    match entry.action {
        Action::Skipped => "[SKIP]",
        Action::Failed => "[FAILED]",
        Action::Applied => "[FIXED]",
        Action::Reverted => "[REMOVED]",
        Action::None => match entry.before {
            Some(ProbeState::Satisfied) => "[OK]",
            Some(ProbeState::Drifted(_)) => "[DRIFT]",
            Some(ProbeState::Absent) => "[ABSENT]",
            Some(ProbeState::Unknown(_)) => "[UNKNOWN]",
            None => "[SKIP]",
        },
    }
}

fn colored_marker(entry: &Entry) -> String {
    let text = format!("{:<10}", marker(entry));
    match marker(entry) {
        "[OK]" | "[FIXED]" | "[REMOVED]" => text.green().to_string(),
        "[DRIFT]" => text.yellow().to_string(),
        "[ABSENT]" if entry.severity == Severity::Critical => text.bright_red().to_string(),
        "[ABSENT]" => text.yellow().to_string(),
        "[UNKNOWN]" => text.cyan().to_string(),
        "[FAILED]" => text.bright_red().to_string(),
        _ => text.dimmed().to_string(),
    }
}

/// Detail shown after the description, if any
pub fn detail(entry: &Entry) -> Option<String> {
    match entry.action {
        Action::Failed => entry.error.clone(),
        Action::Skipped => entry.note.clone(),
        Action::Applied | Action::Reverted => entry.note.clone(),
        Action::None => match &entry.before {
            Some(ProbeState::Drifted(d)) => Some(format!("{} ({})", d, entry.severity)),
            Some(ProbeState::Absent) => Some(entry.severity.to_string()),
            Some(ProbeState::Unknown(reason)) => Some(reason.clone()),
            _ => None,
        },
    }
}

pub fn summary(report: &RunReport) -> String {
    let c = &report.counts;
    format!(
        "{} satisfied, {} drifted, {} unknown, {} applied, {} failed, {} skipped",
        c.satisfied, c.drifted, c.unknown, c.applied, c.failed, c.skipped
    )
}

/// Print a run report
pub fn render_report(report: &RunReport, title: &str) {
    println!();
    println!("{}", format!("[{}]", title).bold());
    for entry in &report.entries {
        let line = format!("{} {}  {}", colored_marker(entry), entry.id, entry.description.dimmed());
        match detail(entry) {
            Some(d) => println!("{}\n{:>11}{}", line, "", d),
            None => println!("{}", line),
        }
    }
    println!();
    println!("{}", summary(report));
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn render_recovery(run: &RecoveryRun) {
    let path: Vec<&str> = run.states.iter().map(|s| s.name()).collect();
    println!("{}", path.join(" -> ").dimmed());
    match run.outcome() {
        RecoveryState::Succeeded(unit) => {
            display_success(&format!("{} restarted; log in again", unit))
        }
        RecoveryState::Failed(reason) => display_error(&reason.to_string()),
        other => display_warning(&format!("recovery stopped in {}", other.name())),
    }
}

/// Display an error
pub fn display_error(message: &str) {
    eprintln!("[ERROR] {}", message.red());
}

/// Display a success message
pub fn display_success(message: &str) {
    println!("[OK] {}", message.green());
}

/// Display an info message
pub fn display_info(message: &str) {
    println!("[INFO] {}", message);
}

/// Display a warning
pub fn display_warning(message: &str) {
    println!("[WARNING] {}", message.yellow());
}
