//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! The report goes to stdout; diagnostics go to stderr through `tracing`.
//! `--quiet` suppresses everything but failures and the summary counts.
//! With `--json` the whole [`RunReport`] is printed as one JSON document
//! and nothing else is written to stdout.

use std::fmt::{Display, Write as _};

use crate::engine::{Outcome, PrStep, ReconciliationResult, RunReport, Steps};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - failures and totals only
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Print a run report.
pub fn print_report(report: &RunReport, verbosity: Verbosity, json: bool) -> serde_json::Result<()> {
    if json {
        println!("{}", render_json(report)?);
        return Ok(());
    }

    if verbosity == Verbosity::Quiet {
        for result in report.results.iter().filter(|r| r.outcome.is_failed()) {
            println!("{}", render_result(result, 0));
        }
    } else {
        print!("{}", render_results(report));
        let table = render_summary_table(report);
        if !table.is_empty() {
            println!();
            println!("Migration summary:");
            print!("{}", table);
        }
    }
    println!();
    println!("{}", render_totals(report));
    Ok(())
}

/// The report as pretty JSON.
pub fn render_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// One block per target, in configuration order.
pub fn render_results(report: &RunReport) -> String {
    let width = report
        .results
        .iter()
        .map(|r| r.target.len())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for result in &report.results {
        out.push_str(&render_result(result, width));
        out.push('\n');
    }
    out
}

fn render_result(result: &ReconciliationResult, width: usize) -> String {
    let mut line = format!(
        "{:<width$}  {:<16}  {:<12}",
        result.target,
        result.outcome.label(),
        result.stage.to_string(),
        width = width
    );
    let steps = describe_steps(&result.steps);
    if !steps.is_empty() {
        line.push_str("  ");
        line.push_str(&steps);
    }
    let line = line.trim_end().to_string();

    let mut out = line;
    if let Outcome::Failed { kind, reason } = &result.outcome {
        let _ = write!(out, "\n    error ({}): {}", kind, reason);
    }
    for warning in &result.warnings {
        let _ = write!(out, "\n    warning: {}", warning);
    }
    out
}

fn describe_steps(steps: &Steps) -> String {
    let mut parts = Vec::new();
    if steps.branch_created {
        parts.push("branch created".to_string());
    }
    if let Some(commit) = &steps.commit {
        parts.push(format!("commit {}", commit.short(7)));
    }
    if steps.pushed {
        if steps.force_with_lease {
            parts.push("pushed (force-with-lease)".to_string());
        } else {
            parts.push("pushed".to_string());
        }
    }
    match &steps.pull_request {
        PrStep::NotConfigured => {}
        PrStep::Skipped { reason } => parts.push(format!("pr skipped: {}", reason)),
        PrStep::Created { number, url }
        | PrStep::AlreadyExisted { number, url }
        | PrStep::Updated { number, url }
        | PrStep::Conflict { number, url } => {
            parts.push(format!("pr {} #{} {}", steps.pull_request.label(), number, url))
        }
    }
    parts.join(", ")
}

/// `N targets: ...` line.
pub fn render_totals(report: &RunReport) -> String {
    let count = |label: &str| {
        report
            .results
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    };
    format!(
        "{} target(s) [{}]: {} reconciled, {} no change needed, {} previewed, {} failed, {} warning(s)",
        report.results.len(),
        report.mode,
        count("reconciled"),
        count("no_change_needed"),
        count("previewed"),
        report.failed_count(),
        report.warning_count()
    )
}

/// Repository | Pattern | Count | Matched Files grid.
///
/// One row per (repository, pattern). Matched files are listed one per
/// line as `path (count)`, or `N/A` when the pattern matched nothing.
/// Empty when no target produced a summary.
pub fn render_summary_table(report: &RunReport) -> String {
    let mut rows: Vec<[String; 4]> = Vec::new();
    for result in &report.results {
        let summary = &result.summary;
        for pattern in &summary.patterns {
            let matched: Vec<String> = summary
                .files
                .iter()
                .filter_map(|file| {
                    file.matches
                        .iter()
                        .find(|m| &m.pattern == pattern)
                        .map(|m| format!("{} ({})", file.path, m.count))
                })
                .collect();
            let count: usize = summary
                .files
                .iter()
                .flat_map(|f| f.matches.iter())
                .filter(|m| &m.pattern == pattern)
                .map(|m| m.count)
                .sum();
            rows.push([
                result.target.clone(),
                pattern.clone(),
                count.to_string(),
                if matched.is_empty() {
                    "N/A".to_string()
                } else {
                    matched.join("\n")
                },
            ]);
        }
    }
    if rows.is_empty() {
        return String::new();
    }
    render_grid(&["Repository", "Pattern", "Count", "Matched Files"], &rows)
}

fn render_grid(headers: &[&str; 4], rows: &[[String; 4]]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let widest = cell.lines().map(str::len).max().unwrap_or(0);
            widths[i] = widths[i].max(widest);
        }
    }

    let border = |fill: char| {
        let mut line = String::from("+");
        for w in &widths {
            line.push_str(&fill.to_string().repeat(w + 2));
            line.push('+');
        }
        line.push('\n');
        line
    };
    let row_lines = |cells: Vec<&str>| {
        let split: Vec<Vec<&str>> = cells.iter().map(|c| c.lines().collect()).collect();
        let height = split.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let mut out = String::new();
        for line in 0..height {
            out.push('|');
            for (i, cell) in split.iter().enumerate() {
                let text = cell.get(line).copied().unwrap_or("");
                let _ = write!(out, " {:<width$} |", text, width = widths[i]);
            }
            out.push('\n');
        }
        out
    };

    let mut out = border('-');
    out.push_str(&row_lines(headers.to_vec()));
    out.push_str(&border('='));
    for row in rows {
        out.push_str(&row_lines(row.iter().map(String::as_str).collect()));
        out.push_str(&border('-'));
    }
    out
}
