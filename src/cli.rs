//! Command-line interface for dirarchive.
//!
//! This module handles:
//! - Argument parsing (`clap`)
//! - Resolving settings and command-line overrides into a run plan
//! - Logging and audit sink setup
//! - Driving the archive run and printing the summary

use crate::archiver::{self, RunOptions, RunSummary};
use crate::audit::{AuditSink, FanoutAuditSink, JsonLinesAuditSink, TracingAuditSink};
use crate::config::{self, ConfigError, FilterConfig, Settings, SizeSetting};
use crate::filter::FilterSet;
use crate::output::OutputFormatter;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Move files matching the given filters into a timestamped subdirectory of
/// each folder.
#[derive(Debug, Clone, Parser)]
#[command(name = "dirarchive", version, about)]
pub struct Cli {
    /// Folders to archive (appended to the folders listed in the settings file).
    pub folders: Vec<PathBuf>,

    /// Settings file (JSON, or TOML when it ends in .toml). Defaults to
    /// ./settings.json when present.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ignore the settings file.
    #[arg(long)]
    pub no_config: bool,

    /// Comma-separated list of allowed extensions (e.g. .pdf,.docx).
    #[arg(long, value_name = "LIST")]
    pub extensions: Option<String>,

    /// Maximum file size (e.g. 10MB, 500KB).
    #[arg(long, value_name = "SIZE")]
    pub size_limit: Option<String>,

    /// Minimum file size (e.g. 1MB, 100KB).
    #[arg(long, value_name = "SIZE")]
    pub min_size: Option<String>,

    /// Only archive files last modified more than N days ago.
    #[arg(long, value_name = "DAYS")]
    pub modified_days: Option<u32>,

    /// Only archive files created more than N days ago.
    #[arg(long, value_name = "DAYS")]
    pub created_days: Option<u32>,

    /// Regular expression the file name must match.
    #[arg(long, value_name = "REGEX")]
    pub regex: Option<String>,

    /// Comma-separated substrings; files whose names contain any are skipped.
    #[arg(long, value_name = "LIST")]
    pub exclude: Option<String>,

    /// Stop at the first folder that fails.
    #[arg(long)]
    pub strict: bool,

    /// Report what would be archived without moving files.
    #[arg(long)]
    pub dry_run: bool,

    /// Show debug output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Write audit events to this JSON-lines file.
    #[arg(long, value_name = "FILE", conflicts_with = "no_audit_log")]
    pub audit_log: Option<PathBuf>,

    /// Do not write an audit log file.
    #[arg(long)]
    pub no_audit_log: bool,
}

impl Cli {
    /// Filter settings given on the command line.
    pub fn filter_overrides(&self) -> FilterConfig {
        FilterConfig {
            extensions: self.extensions.as_deref().map(config::split_list),
            size_limit: self.size_limit.clone().map(SizeSetting::Text),
            min_size: self.min_size.clone().map(SizeSetting::Text),
            modified_days: self.modified_days,
            created_days: self.created_days,
            regex: self.regex.clone(),
            exclude: self.exclude.as_deref().map(config::split_list),
        }
    }
}

/// Everything needed to run an archive pass.
#[derive(Debug)]
pub struct RunPlan {
    pub folders: Vec<PathBuf>,
    pub filters: FilterSet,
    pub options: RunOptions,
    pub verbose: bool,
    /// Where to write the audit file, if anywhere.
    pub audit_log: Option<PathBuf>,
}

impl RunPlan {
    /// Resolves settings and command-line arguments into a run plan.
    ///
    /// Command-line filter options replace the settings file's
    /// `default_filters` field by field.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be loaded, the filters do not
    /// compile, or no folder was given.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let settings = if cli.no_config {
            None
        } else {
            Some(Settings::load(cli.config.as_deref())?)
        };

        let mut filter_config = settings
            .as_ref()
            .map(|s| s.default_filters.clone())
            .unwrap_or_default();
        filter_config.merge(cli.filter_overrides());
        let filters = filter_config.compile()?;

        let folders = config::resolve_folders(settings.as_ref(), &cli.folders)?;

        let logging = settings.map(|s| s.logging).unwrap_or_default();
        let audit_log = if cli.no_audit_log {
            None
        } else if let Some(path) = &cli.audit_log {
            Some(path.clone())
        } else if logging.enable_audit_log {
            Some(logging.audit_log)
        } else {
            None
        };

        Ok(Self {
            folders,
            filters,
            options: RunOptions {
                dry_run: cli.dry_run,
                strict: cli.strict,
            },
            verbose: cli.verbose || logging.verbose,
            audit_log,
        })
    }
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the crate logs at `info`, or
/// `debug` when verbose. Calling this more than once is harmless.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "dirarchive=debug,audit=info"
    } else {
        "dirarchive=info,audit=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Builds the audit sink for a plan: tracing always, plus the JSON-lines
/// file when one is configured.
///
/// # Errors
///
/// Returns an error if the audit file cannot be opened.
pub fn build_audit_sink(plan: &RunPlan) -> anyhow::Result<FanoutAuditSink> {
    let mut sink = FanoutAuditSink::new().with(TracingAuditSink);
    if let Some(path) = &plan.audit_log {
        let file_sink = JsonLinesAuditSink::open(path)
            .with_context(|| format!("failed to open audit log {}", path.display()))?;
        tracing::debug!("Writing audit events to {}", file_sink.path().display());
        sink = sink.with(file_sink);
    }
    Ok(sink)
}

/// Runs the plan, printing per-folder lines and the final summary table.
pub fn execute(plan: &RunPlan, audit: &dyn AuditSink) -> RunSummary {
    if plan.options.dry_run {
        OutputFormatter::dry_run_notice("No files will be moved.");
    }

    let pb = OutputFormatter::create_progress_bar(plan.folders.len() as u64);
    let summary = archiver::run_archive(
        &plan.folders,
        &plan.filters,
        plan.options,
        audit,
        |outcome| {
            pb.suspend(|| OutputFormatter::folder_line(outcome));
            pb.inc(1);
        },
    );
    pb.finish_and_clear();

    OutputFormatter::summary_table(&summary);
    if summary.aborted {
        OutputFormatter::warning("Strict mode: run stopped after the first failed folder.");
    }
    if plan.options.dry_run {
        OutputFormatter::dry_run_notice("Dry run complete. No files were moved.");
    }

    summary
}

/// Entry point used by the binary. Returns the process exit code.
///
/// # Errors
///
/// Returns an error if the run cannot be planned or the audit log cannot be
/// opened. Folder failures are reported through the exit code instead.
pub fn run_cli(cli: Cli) -> anyhow::Result<i32> {
    let plan = RunPlan::resolve(&cli).context("invalid configuration")?;
    init_logging(plan.verbose);

    OutputFormatter::info(&format!("Archiving {} folder(s)", plan.folders.len()));
    let audit = build_audit_sink(&plan)?;
    let summary = execute(&plan, &audit);

    tracing::info!(
        "Archive complete: {}/{} folders succeeded",
        summary.succeeded(),
        summary.requested
    );
    Ok(summary.exit_code())
}
