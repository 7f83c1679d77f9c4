//! dirarchive - move old, large or otherwise matching files out of the way
//!
//! This library scans folders, evaluates each direct child file against a
//! configurable [`FilterSet`] and moves admitted files into a timestamp-named
//! subdirectory, reporting every step to an [`AuditSink`]. Settings are loaded
//! from JSON or TOML files and can be overridden from the command line.

pub mod archiver;
pub mod audit;
pub mod cli;
pub mod config;
pub mod filter;
pub mod output;
pub mod size;

pub use archiver::{
    FolderError, FolderResult, MoveError, RunOptions, RunSummary, archive_folder,
    archive_folder_at, run_archive,
};
pub use audit::{ArchiveEvent, AuditAction, AuditSink, AuditStatus, MemoryAuditSink};
pub use config::{ConfigError, FilterConfig, Settings};
pub use filter::{Decision, EvaluationError, FileRecord, FilterSet, Rejection, evaluate};
pub use size::{SizeError, parse_size};

pub use cli::{Cli, run_cli};
