//! File filter evaluation.
//!
//! A [`FilterSet`] holds the compiled constraints for a run. Each candidate
//! file is read into a [`FileRecord`] and checked against the set, producing a
//! [`Decision`]. Constraints are checked in a fixed order and the first one
//! that fails decides the [`Rejection`]:
//!
//! 1. Extension whitelist
//! 2. Maximum size
//! 3. Minimum size
//! 4. Modified more recently than N days ago
//! 5. Created more recently than N days ago
//! 6. Name regex (search, not full match)
//! 7. Excluded substrings, in configured order
//!
//! Failing to read a file's metadata is not a rejection: [`evaluate`] returns
//! an [`EvaluationError`] so callers can tell "filtered out" from "broken".

use crate::audit::{ArchiveEvent, AuditAction, AuditSink, AuditStatus};
use chrono::{DateTime, Duration, Local};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Compiled, validated filter constraints.
///
/// Every field is optional; `None` (or an empty collection) means "no
/// constraint of this kind". A file is admitted only when every present
/// constraint holds.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    /// Allowed extensions, lower-cased and dot-prefixed (e.g. `.pdf`).
    pub extensions: Option<HashSet<String>>,
    /// Files larger than this many bytes are rejected.
    pub size_limit: Option<u64>,
    /// Files smaller than this many bytes are rejected.
    pub min_size: Option<u64>,
    /// Files modified within this many days are rejected.
    pub modified_within_days: Option<u32>,
    /// Files created within this many days are rejected.
    pub created_within_days: Option<u32>,
    /// The filename must contain a match for this pattern.
    pub name_pattern: Option<Regex>,
    /// Filenames containing any of these substrings are rejected.
    pub exclude_substrings: Vec<String>,
}

impl FilterSet {
    /// Creates a filter set with no constraints, which admits every file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts admitted files to the given extensions.
    ///
    /// Extensions are normalized to lower case with a leading dot, so
    /// `"PDF"`, `".pdf"` and `"pdf"` are equivalent.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = Some(
            extensions
                .into_iter()
                .filter_map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        );
        self
    }

    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = Some(bytes);
        self
    }

    pub fn with_min_size(mut self, bytes: u64) -> Self {
        self.min_size = Some(bytes);
        self
    }

    pub fn with_modified_within_days(mut self, days: u32) -> Self {
        self.modified_within_days = Some(days);
        self
    }

    pub fn with_created_within_days(mut self, days: u32) -> Self {
        self.created_within_days = Some(days);
        self
    }

    pub fn with_name_pattern(mut self, pattern: Regex) -> Self {
        self.name_pattern = Some(pattern);
        self
    }

    pub fn with_exclude_substrings<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_substrings = substrings.into_iter().map(Into::into).collect();
        self
    }

    /// Checks a file record against every constraint, in order.
    ///
    /// `now` anchors the recency checks so that results are reproducible.
    pub fn check(&self, record: &FileRecord, now: DateTime<Local>) -> Decision {
        if let Some(allowed) = &self.extensions {
            match record.extension() {
                Some(ext) if allowed.contains(&ext) => {}
                found => return Decision::Reject(Rejection::Extension { found }),
            }
        }

        if let Some(limit) = self.size_limit
            && record.size > limit
        {
            return Decision::Reject(Rejection::TooLarge {
                size: record.size,
                limit,
            });
        }

        if let Some(minimum) = self.min_size
            && record.size < minimum
        {
            return Decision::Reject(Rejection::TooSmall {
                size: record.size,
                minimum,
            });
        }

        if let Some(days) = self.modified_within_days
            && !is_older_than(record.modified, now, days)
        {
            return Decision::Reject(Rejection::ModifiedRecently { days });
        }

        if let Some(days) = self.created_within_days
            && !is_older_than(record.created, now, days)
        {
            return Decision::Reject(Rejection::CreatedRecently { days });
        }

        if let Some(pattern) = &self.name_pattern
            && !pattern.is_match(&record.file_name)
        {
            return Decision::Reject(Rejection::NamePattern {
                pattern: pattern.as_str().to_string(),
            });
        }

        if let Some(substring) = self
            .exclude_substrings
            .iter()
            .find(|substring| record.file_name.contains(substring.as_str()))
        {
            return Decision::Reject(Rejection::Excluded {
                substring: substring.clone(),
            });
        }

        Decision::Admit
    }
}

/// Returns true when `time` is at or before `now - days`.
///
/// A cutoff outside the representable date range means no file is old enough.
fn is_older_than(time: DateTime<Local>, now: DateTime<Local>, days: u32) -> bool {
    Duration::try_days(i64::from(days))
        .and_then(|delta| now.checked_sub_signed(delta))
        .is_some_and(|cutoff| time <= cutoff)
}

/// Normalizes an extension to lower case with a leading dot.
///
/// Returns `None` for blank input.
pub fn normalize_extension(ext: &str) -> Option<String> {
    let trimmed = ext.trim();
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with('.') {
        Some(lower)
    } else {
        Some(format!(".{}", lower))
    }
}

/// Metadata snapshot of a candidate file, read at evaluation time.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub modified: DateTime<Local>,
    /// Birth time, or the modification time where the platform has none.
    pub created: DateTime<Local>,
}

impl FileRecord {
    /// Reads the metadata of `path` from the filesystem.
    pub fn read(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified = metadata.modified()?;
        let created = metadata.created().unwrap_or(modified);

        Ok(Self {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            size: metadata.len(),
            modified: DateTime::<Local>::from(modified),
            created: DateTime::<Local>::from(created),
        })
    }

    /// Returns the lower-cased, dot-prefixed extension, if the file has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{}", ext))
    }
}

/// Outcome of checking a file against a [`FilterSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject(Rejection),
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// The first constraint a file failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Extension missing or not in the allowed set.
    Extension { found: Option<String> },
    TooLarge { size: u64, limit: u64 },
    TooSmall { size: u64, minimum: u64 },
    ModifiedRecently { days: u32 },
    CreatedRecently { days: u32 },
    NamePattern { pattern: String },
    Excluded { substring: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Extension { found: Some(ext) } => {
                write!(f, "extension {} is not in the allowed list", ext)
            }
            Rejection::Extension { found: None } => {
                write!(f, "file has no extension and an extension list is set")
            }
            Rejection::TooLarge { size, limit } => {
                write!(f, "size {} bytes exceeds the limit of {} bytes", size, limit)
            }
            Rejection::TooSmall { size, minimum } => {
                write!(f, "size {} bytes is below the minimum of {} bytes", size, minimum)
            }
            Rejection::ModifiedRecently { days } => {
                write!(f, "modified within the last {} days", days)
            }
            Rejection::CreatedRecently { days } => {
                write!(f, "created within the last {} days", days)
            }
            Rejection::NamePattern { pattern } => {
                write!(f, "name does not match pattern {}", pattern)
            }
            Rejection::Excluded { substring } => {
                write!(f, "name contains excluded pattern {}", substring)
            }
        }
    }
}

/// A file's metadata could not be read during filtering.
#[derive(Debug, thiserror::Error)]
#[error("evaluation error for {}: {source}", .path.display())]
pub struct EvaluationError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Evaluates the file at `path` against `filters`.
///
/// Rejections are reported to `audit` as `FILTER_CHECK`/`SKIPPED` and
/// metadata failures as `FILTER_CHECK`/`ERROR`. Admitted files produce no
/// audit event here.
///
/// # Errors
///
/// Returns [`EvaluationError`] when the file's metadata cannot be read, for
/// example because it vanished or access was denied.
pub fn evaluate(
    path: &Path,
    filters: &FilterSet,
    audit: &dyn AuditSink,
) -> Result<Decision, EvaluationError> {
    let started = Instant::now();

    let record = match FileRecord::read(path) {
        Ok(record) => record,
        Err(source) => {
            let error = EvaluationError {
                path: path.to_path_buf(),
                source,
            };
            tracing::warn!("{}", error);
            audit.record(ArchiveEvent::new(
                AuditAction::FilterCheck,
                path,
                AuditStatus::Error,
                started,
                format!("filter check failed: {}", error.source),
            ));
            return Err(error);
        }
    };

    let decision = filters.check(&record, Local::now());
    match &decision {
        Decision::Admit => tracing::debug!("Admitted {}", path.display()),
        Decision::Reject(reason) => {
            tracing::debug!("Skipped {}: {}", path.display(), reason);
            audit.record(ArchiveEvent::new(
                AuditAction::FilterCheck,
                path,
                AuditStatus::Skipped,
                started,
                reason.to_string(),
            ));
        }
    }

    Ok(decision)
}
