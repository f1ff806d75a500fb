pub mod types;

pub use types::SummaryReport;

use crate::pr::{ChangedFile, PullRequest, PullRequestRef};
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Combine PR metadata, the collected files and the final summary.
pub fn build(
    pr: &PullRequestRef,
    pull: &PullRequest,
    files: &[ChangedFile],
    summary: String,
) -> SummaryReport {
    SummaryReport {
        pr: pr.to_string(),
        pr_title: pull.title.clone(),
        files: files.iter().map(|f| f.path.clone()).collect(),
        files_without_patch: files.iter().filter(|f| f.patch.is_empty()).count(),
        summary,
    }
}

/// Print to the terminal, or write markdown when a path is given.
#[instrument(skip(report), fields(pr = %report.pr))]
pub fn output(report: &SummaryReport, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            std::fs::write(path, render_markdown(report))?;
            Ok(())
        }
    }
}

fn print_terminal_report(report: &SummaryReport) {
    println!();
    println!("{} \"{}\"", report.pr.bold(), report.pr_title);
    println!(
        "Files summarized: {} ({} without patch)",
        report.files_considered(),
        report.files_without_patch
    );
    println!();
    println!("═══ {} ═══", "Summary".cyan().bold());
    println!("{}", report.summary);
    println!();
    for path in &report.files {
        println!("  • {}", path.dimmed());
    }
    println!();
}

fn render_markdown(report: &SummaryReport) -> String {
    let mut md = String::new();
    md.push_str(&format!("# {}: \"{}\"\n\n", report.pr, report.pr_title));
    md.push_str(&format!(
        "**Files summarized:** {} | **Without patch:** {}\n\n",
        report.files_considered(),
        report.files_without_patch
    ));
    md.push_str("## Summary\n\n");
    md.push_str(report.summary.trim());
    md.push_str("\n\n## Files\n\n");
    for path in &report.files {
        md.push_str(&format!("- `{}`\n", path));
    }
    md
}
