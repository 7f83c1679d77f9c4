//! Audit event stream.
//!
//! The archiving core reports every significant step as an [`ArchiveEvent`]
//! passed to an [`AuditSink`]. The core never formats or stores events; the
//! sinks in this module decide what happens to them:
//!
//! - [`TracingAuditSink`] forwards events to `tracing` under the `audit` target
//! - [`JsonLinesAuditSink`] appends one JSON object per event to a file
//! - [`MemoryAuditSink`] keeps events in memory for later inspection
//! - [`FanoutAuditSink`] forwards each event to several sinks

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The step of the archiving workflow an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    FolderStart,
    FolderCreate,
    FilterCheck,
    FileMove,
    FolderError,
    FolderComplete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::FolderStart => "FOLDER_START",
            AuditAction::FolderCreate => "FOLDER_CREATE",
            AuditAction::FilterCheck => "FILTER_CHECK",
            AuditAction::FileMove => "FILE_MOVE",
            AuditAction::FolderError => "FOLDER_ERROR",
            AuditAction::FolderComplete => "FOLDER_COMPLETE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Started,
    Success,
    Skipped,
    Failed,
    Error,
    Completed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Started => "STARTED",
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Skipped => "SKIPPED",
            AuditStatus::Failed => "FAILED",
            AuditStatus::Error => "ERROR",
            AuditStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit record.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEvent {
    /// Local time at which the event was produced.
    pub timestamp: DateTime<Local>,
    pub action: AuditAction,
    /// Folder or file the event is about.
    pub target: PathBuf,
    pub status: AuditStatus,
    /// Time elapsed since the operation that triggered the event began.
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub message: String,
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration_millis(*duration))
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ArchiveEvent {
    /// Builds an event whose duration is measured from `started`.
    pub fn new(
        action: AuditAction,
        target: &Path,
        status: AuditStatus,
        started: Instant,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            action,
            target: target.to_path_buf(),
            status,
            duration: started.elapsed(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ArchiveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | {} | {}ms | {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.action,
            self.target.display(),
            self.status,
            self.duration.as_millis(),
            self.message
        )
    }
}

/// Receiver of audit events.
///
/// Sinks must not fail the archiving workflow: any error writing an event is
/// handled (and logged) inside the sink.
pub trait AuditSink {
    fn record(&self, event: ArchiveEvent);
}

impl<S: AuditSink + ?Sized> AuditSink for &S {
    fn record(&self, event: ArchiveEvent) {
        (**self).record(event);
    }
}

impl<S: AuditSink + ?Sized> AuditSink for Box<S> {
    fn record(&self, event: ArchiveEvent) {
        (**self).record(event);
    }
}

/// Forwards events to `tracing` with target `audit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: ArchiveEvent) {
        let duration_ms = duration_millis(event.duration);
        let target = event.target.display().to_string();
        match event.status {
            AuditStatus::Failed | AuditStatus::Error => tracing::warn!(
                target: "audit",
                action = event.action.as_str(),
                target_path = %target,
                status = event.status.as_str(),
                duration_ms,
                "{}",
                event.message
            ),
            _ => tracing::info!(
                target: "audit",
                action = event.action.as_str(),
                target_path = %target,
                status = event.status.as_str(),
                duration_ms,
                "{}",
                event.message
            ),
        }
    }
}

/// Appends events as JSON lines to a file.
pub struct JsonLinesAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    /// Opens (or creates) the audit file in append mode, creating missing
    /// parent directories.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, event: ArchiveEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Could not serialize audit event: {}", e);
                return;
            }
        };

        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{}", line) {
            tracing::error!(
                "Could not write audit event to {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<ArchiveEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event recorded so far, in order.
    pub fn events(&self) -> Vec<ArchiveEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the `(action, status)` pairs recorded so far, in order.
    pub fn actions(&self) -> Vec<(AuditAction, AuditStatus)> {
        self.events()
            .iter()
            .map(|event| (event.action, event.status))
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: ArchiveEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards each event to every contained sink, in order.
#[derive(Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl AuditSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: ArchiveEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}
