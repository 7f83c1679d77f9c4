//! Console output formatting.
//!
//! Provides a centralized interface for user-facing CLI output: coloured status
//! lines, the per-folder progress bar and the end-of-run summary table.
//! Diagnostic logging goes through `tracing` instead.

use crate::archiver::{FolderOutcome, RunSummary};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirarchive::output::OutputFormatter;
    /// OutputFormatter::success("Folder archived");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a progress bar counting processed folders.
    ///
    /// The bar is hidden for single-folder runs.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        if total <= 1 {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints one line describing a folder's outcome.
    pub fn folder_line(outcome: &FolderOutcome) {
        let folder = outcome.folder.display().to_string();
        match &outcome.result {
            Ok(result) if result.is_success() => Self::success(&format!(
                "{}: {} archived, {} skipped, {} failed",
                folder, result.processed, result.skipped, result.failed
            )),
            Ok(result) => Self::error(&format!(
                "{}: {} archived, {} skipped, {} failed",
                folder, result.processed, result.skipped, result.failed
            )),
            Err(e) => Self::error(&format!("{}: {}", folder, e)),
        }
    }

    /// Prints a summary table with per-folder counters and the run total.
    pub fn summary_table(summary: &RunSummary) {
        Self::header("SUMMARY");

        let rows: Vec<(String, &FolderOutcome)> = summary
            .outcomes
            .iter()
            .map(|outcome| (outcome.folder.display().to_string(), outcome))
            .collect();

        let width = rows
            .iter()
            .map(|(name, _)| name.chars().count())
            .max()
            .unwrap_or(0)
            .max(6);

        println!(
            "{:<width$} | {:>8} | {:>7} | {:>6} | {}",
            "Folder".bold(),
            "Archived".bold(),
            "Skipped".bold(),
            "Failed".bold(),
            "Status".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 42));

        for (name, outcome) in &rows {
            match &outcome.result {
                Ok(result) => {
                    let status = if result.is_success() {
                        "ok".green()
                    } else {
                        "failed".red()
                    };
                    println!(
                        "{:<width$} | {:>8} | {:>7} | {:>6} | {}",
                        name,
                        result.processed,
                        result.skipped,
                        result.failed,
                        status,
                        width = width
                    );
                }
                Err(_) => println!(
                    "{:<width$} | {:>8} | {:>7} | {:>6} | {}",
                    name,
                    "-",
                    "-",
                    "-",
                    "error".red(),
                    width = width
                ),
            }
        }

        println!("{}", "-".repeat(width + 42));
        let totals = format!("{}/{}", summary.succeeded(), summary.requested);
        let totals = if summary.is_success() {
            totals.green().bold()
        } else {
            totals.red().bold()
        };
        println!("Archived folders: {}", totals);
    }
}
