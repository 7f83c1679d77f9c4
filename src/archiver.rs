/// Folder archiving: moving filtered files into a timestamped subdirectory.
///
/// For each source folder the archiver validates the folder, creates a
/// destination directory named after the current local time, evaluates every
/// regular file directly inside the folder and moves the admitted ones into
/// the destination. Per-file problems are counted and never abort a folder;
/// per-folder problems are returned as [`FolderError`] and never abort a run
/// unless strict mode is requested.
use crate::audit::{ArchiveEvent, AuditAction, AuditSink, AuditStatus};
use crate::filter::{self, Decision, FilterSet};
use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Format of destination directory names, to the second.
pub const DESTINATION_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Counters for one processed folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderResult {
    /// The folder that was processed.
    pub source: PathBuf,
    /// The timestamped directory files were (or would be) moved into.
    pub destination: PathBuf,
    /// Files archived, or that would have been archived in a dry run.
    pub processed: usize,
    /// Files rejected by the filters, plus entries whose metadata or type
    /// could not be read.
    pub skipped: usize,
    /// Files admitted but not moved.
    pub failed: usize,
    pub dry_run: bool,
}

impl FolderResult {
    fn new(source: &Path, destination: PathBuf, dry_run: bool) -> Self {
        Self {
            source: source.to_path_buf(),
            destination,
            processed: 0,
            skipped: 0,
            failed: 0,
            dry_run,
        }
    }

    /// A folder fails only when something failed and nothing was archived.
    ///
    /// A folder where every file was skipped counts as a success.
    pub fn is_success(&self) -> bool {
        self.processed > 0 || self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// Errors that stop a single folder from being processed.
#[derive(Debug, thiserror::Error)]
pub enum FolderError {
    /// The source folder does not exist.
    #[error("folder does not exist: {}", .path.display())]
    NotFound { path: PathBuf },
    /// The destination directory could not be created.
    #[error("failed to create archive directory {}: {source}", .path.display())]
    DestinationCreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The source folder could not be listed.
    #[error("failed to read folder {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors moving a single admitted file.
#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    /// A file with the same name already exists in the destination.
    #[error("{} already exists", .destination.display())]
    Collision { destination: PathBuf },
    /// The rename itself failed.
    #[error("failed to move {} to {}: {source}", .source_path.display(), .destination.display())]
    Io {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Lifecycle of a single folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FolderState {
    NotStarted,
    SourceValidated,
    DestinationCreated,
    Processing,
    Completed,
    Failed,
}

/// Returns the destination directory name for the given time.
pub fn destination_name(timestamp: DateTime<Local>) -> String {
    timestamp.format(DESTINATION_FORMAT).to_string()
}

/// Archives `source` using the current local time for the destination name.
///
/// # Errors
///
/// See [`archive_folder_at`].
pub fn archive_folder(
    source: &Path,
    filters: &FilterSet,
    dry_run: bool,
    audit: &dyn AuditSink,
) -> Result<FolderResult, FolderError> {
    archive_folder_at(source, filters, dry_run, audit, Local::now())
}

/// Archives the regular files directly inside `source` into
/// `source/<timestamp>`.
///
/// The destination is created even in dry-run mode, and an existing
/// destination with the same name is reused. Files are visited in directory
/// listing order. In a dry run admitted files are counted as processed but
/// left in place.
///
/// # Errors
///
/// Returns [`FolderError::NotFound`] if `source` does not exist (nothing is
/// created), [`FolderError::DestinationCreateFailed`] if the destination
/// cannot be created, and [`FolderError::ReadFailed`] if `source` cannot be
/// listed.
pub fn archive_folder_at(
    source: &Path,
    filters: &FilterSet,
    dry_run: bool,
    audit: &dyn AuditSink,
    timestamp: DateTime<Local>,
) -> Result<FolderResult, FolderError> {
    let folder_start = Instant::now();
    let mut state = FolderState::NotStarted;
    audit.record(ArchiveEvent::new(
        AuditAction::FolderStart,
        source,
        AuditStatus::Started,
        folder_start,
        "started processing folder",
    ));

    if !source.exists() {
        transition(source, &mut state, FolderState::Failed);
        tracing::error!("Folder does not exist: {}", source.display());
        audit.record(ArchiveEvent::new(
            AuditAction::FolderError,
            source,
            AuditStatus::Failed,
            folder_start,
            "folder does not exist",
        ));
        return Err(FolderError::NotFound {
            path: source.to_path_buf(),
        });
    }
    transition(source, &mut state, FolderState::SourceValidated);

    let destination = source.join(destination_name(timestamp));
    if let Err(e) = fs::create_dir_all(&destination) {
        transition(source, &mut state, FolderState::Failed);
        tracing::error!(
            "Failed to create archive directory {}: {}",
            destination.display(),
            e
        );
        audit.record(ArchiveEvent::new(
            AuditAction::FolderCreate,
            &destination,
            AuditStatus::Failed,
            folder_start,
            format!("creation failed: {}", e),
        ));
        return Err(FolderError::DestinationCreateFailed {
            path: destination,
            source: e,
        });
    }
    audit.record(ArchiveEvent::new(
        AuditAction::FolderCreate,
        &destination,
        AuditStatus::Success,
        folder_start,
        "archive directory ready",
    ));
    transition(source, &mut state, FolderState::DestinationCreated);

    let entries = match fs::read_dir(source) {
        Ok(entries) => entries,
        Err(e) => {
            transition(source, &mut state, FolderState::Failed);
            tracing::error!("Failed to read folder {}: {}", source.display(), e);
            audit.record(ArchiveEvent::new(
                AuditAction::FolderError,
                source,
                AuditStatus::Failed,
                folder_start,
                format!("failed to read folder: {}", e),
            ));
            return Err(FolderError::ReadFailed {
                path: source.to_path_buf(),
                source: e,
            });
        }
    };
    transition(source, &mut state, FolderState::Processing);

    let mut result = FolderResult::new(source, destination, dry_run);

    for entry in entries {
        let file_start = Instant::now();
        let file_path = match regular_file(entry) {
            Ok(Some(path)) => path,
            Ok(None) => continue,
            Err(unreadable) => {
                report_unreadable(source, &unreadable, audit, file_start);
                result.skipped += 1;
                continue;
            }
        };

        match filter::evaluate(&file_path, filters, audit) {
            Ok(Decision::Admit) => {}
            Ok(Decision::Reject(_)) | Err(_) => {
                result.skipped += 1;
                continue;
            }
        }

        if dry_run {
            tracing::info!(
                "[DRY RUN] Would archive {} into {}",
                file_path.display(),
                result.destination.display()
            );
            result.processed += 1;
            continue;
        }

        match move_into(&file_path, &result.destination) {
            Ok(new_path) => {
                result.processed += 1;
                tracing::debug!("Archived {} to {}", file_path.display(), new_path.display());
                audit.record(ArchiveEvent::new(
                    AuditAction::FileMove,
                    &file_path,
                    AuditStatus::Success,
                    file_start,
                    format!("archived to {}", result.destination.display()),
                ));
            }
            Err(e) => {
                result.failed += 1;
                tracing::error!("Failed to archive {}: {}", file_path.display(), e);
                audit.record(ArchiveEvent::new(
                    AuditAction::FileMove,
                    &file_path,
                    AuditStatus::Failed,
                    file_start,
                    format!("archive failed: {}", e),
                ));
            }
        }
    }

    transition(source, &mut state, FolderState::Completed);
    tracing::info!(
        "Finished {}: {} archived, {} skipped, {} failed",
        source.display(),
        result.processed,
        result.skipped,
        result.failed
    );
    audit.record(ArchiveEvent::new(
        AuditAction::FolderComplete,
        source,
        AuditStatus::Completed,
        folder_start,
        format!(
            "{} archived, {} skipped, {} failed",
            result.processed, result.skipped, result.failed
        ),
    ));

    Ok(result)
}

/// A directory entry whose type could not be determined.
#[derive(Debug)]
struct UnreadableEntry {
    /// `None` when the listing itself failed before yielding a name.
    path: Option<PathBuf>,
    error: io::Error,
}

/// Returns the path of `entry` if it is a regular file, `None` for anything
/// else.
fn regular_file(entry: io::Result<fs::DirEntry>) -> Result<Option<PathBuf>, UnreadableEntry> {
    let entry = entry.map_err(|error| UnreadableEntry { path: None, error })?;
    let file_type = entry.file_type().map_err(|error| UnreadableEntry {
        path: Some(entry.path()),
        error,
    })?;
    Ok(file_type.is_file().then(|| entry.path()))
}

/// Logs and audits an entry that could not be inspected.
fn report_unreadable(
    source: &Path,
    unreadable: &UnreadableEntry,
    audit: &dyn AuditSink,
    started: Instant,
) {
    let target = unreadable.path.as_deref().unwrap_or(source);
    tracing::warn!(
        "Could not inspect entry {}: {}",
        target.display(),
        unreadable.error
    );
    audit.record(ArchiveEvent::new(
        AuditAction::FilterCheck,
        target,
        AuditStatus::Error,
        started,
        format!("could not read directory entry: {}", unreadable.error),
    ));
}

fn transition(source: &Path, state: &mut FolderState, next: FolderState) {
    tracing::trace!("{}: {:?} -> {:?}", source.display(), state, next);
    *state = next;
}

/// Moves `file_path` into `destination_dir`, keeping its file name.
///
/// Refuses to overwrite an existing entry of the same name.
pub fn move_into(file_path: &Path, destination_dir: &Path) -> Result<PathBuf, MoveError> {
    let file_name = file_path.file_name().ok_or_else(|| MoveError::Io {
        source_path: file_path.to_path_buf(),
        destination: destination_dir.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "file has no name component"),
    })?;

    let destination = destination_dir.join(file_name);
    if destination.symlink_metadata().is_ok() {
        return Err(MoveError::Collision { destination });
    }

    fs::rename(file_path, &destination).map_err(|e| MoveError::Io {
        source_path: file_path.to_path_buf(),
        destination: destination.clone(),
        source: e,
    })?;

    Ok(destination)
}

/// Options for a multi-folder run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Count what would be archived without moving anything.
    pub dry_run: bool,
    /// Stop at the first folder that does not succeed.
    pub strict: bool,
}

/// Outcome of processing one folder in a run.
#[derive(Debug)]
pub struct FolderOutcome {
    pub folder: PathBuf,
    pub result: Result<FolderResult, FolderError>,
}

impl FolderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(result) if result.is_success())
    }
}

/// Outcome of a multi-folder run.
#[derive(Debug)]
pub struct RunSummary {
    /// Folders actually processed, in order.
    pub outcomes: Vec<FolderOutcome>,
    /// Number of folders requested.
    pub requested: usize,
    /// True when strict mode stopped the run early.
    pub aborted: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// True when every requested folder was processed successfully.
    pub fn is_success(&self) -> bool {
        !self.aborted && self.succeeded() == self.requested
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// Archives each folder in order, one at a time.
///
/// `on_folder` is called after each folder with its outcome, which lets
/// callers drive progress output.
pub fn run_archive<P: AsRef<Path>>(
    folders: &[P],
    filters: &FilterSet,
    options: RunOptions,
    audit: &dyn AuditSink,
    mut on_folder: impl FnMut(&FolderOutcome),
) -> RunSummary {
    let mut summary = RunSummary {
        outcomes: Vec::with_capacity(folders.len()),
        requested: folders.len(),
        aborted: false,
    };

    for folder in folders {
        let folder = folder.as_ref();
        let outcome = FolderOutcome {
            folder: folder.to_path_buf(),
            result: archive_folder(folder, filters, options.dry_run, audit),
        };
        on_folder(&outcome);

        let failed = !outcome.is_success();
        summary.outcomes.push(outcome);

        if failed && options.strict {
            tracing::error!(
                "Strict mode: stopping after failed folder {}",
                folder.display()
            );
            summary.aborted = true;
            break;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn test_destination_name_format() {
        assert_eq!(destination_name(fixed_time()), "2024-03-09_14-05-07");
    }

    #[test]
    fn test_success_predicate() {
        let mut result = FolderResult::new(Path::new("/src"), PathBuf::from("/src/d"), false);
        assert!(result.is_success());

        result.skipped = 4;
        assert!(result.is_success(), "all-skipped folder is a success");

        result.failed = 1;
        assert!(!result.is_success());

        result.processed = 1;
        assert!(result.is_success(), "any archived file makes it a success");
        assert_eq!(result.total(), 6);
    }

    #[test]
    fn test_missing_folder_creates_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let missing = temp_dir.path().join("missing");
        let audit = MemoryAuditSink::new();

        let result = archive_folder(&missing, &FilterSet::new(), false, &audit);

        assert!(matches!(result, Err(FolderError::NotFound { .. })));
        assert!(!missing.exists());
        assert_eq!(
            audit.actions(),
            vec![
                (AuditAction::FolderStart, AuditStatus::Started),
                (AuditAction::FolderError, AuditStatus::Failed),
            ]
        );
    }

    #[test]
    fn test_destination_create_failure() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let not_a_dir = temp_dir.path().join("plain.txt");
        fs::write(&not_a_dir, "x").expect("Failed to write file");
        let audit = MemoryAuditSink::new();

        let result = archive_folder(&not_a_dir, &FilterSet::new(), false, &audit);

        assert!(matches!(
            result,
            Err(FolderError::DestinationCreateFailed { .. })
        ));
        assert_eq!(
            audit.actions().last(),
            Some(&(AuditAction::FolderCreate, AuditStatus::Failed))
        );
    }

    #[test]
    fn test_archives_files_and_emits_events_in_order() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("a.txt"), "a").expect("Failed to write file");
        fs::write(base.join("b.csv"), "b").expect("Failed to write file");

        let filters = FilterSet::new().with_extensions([".txt"]);
        let audit = MemoryAuditSink::new();
        let result = archive_folder_at(base, &filters, false, &audit, fixed_time())
            .expect("archive failed");

        assert_eq!((result.processed, result.skipped, result.failed), (1, 1, 0));
        assert_eq!(result.destination, base.join("2024-03-09_14-05-07"));
        assert!(result.destination.join("a.txt").exists());
        assert!(base.join("b.csv").exists());

        let actions = audit.actions();
        assert_eq!(
            actions.first(),
            Some(&(AuditAction::FolderStart, AuditStatus::Started))
        );
        assert_eq!(
            actions.get(1),
            Some(&(AuditAction::FolderCreate, AuditStatus::Success))
        );
        assert_eq!(
            actions.last(),
            Some(&(AuditAction::FolderComplete, AuditStatus::Completed))
        );
        assert!(actions.contains(&(AuditAction::FileMove, AuditStatus::Success)));
        assert!(actions.contains(&(AuditAction::FilterCheck, AuditStatus::Skipped)));
        assert_eq!(actions.len(), 5);
    }

    #[test]
    fn test_collision_counts_as_failure() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let destination = base.join(destination_name(fixed_time()));
        fs::create_dir(&destination).expect("Failed to create destination");
        fs::write(destination.join("dup.txt"), "old").expect("Failed to write file");
        fs::write(base.join("dup.txt"), "new").expect("Failed to write file");

        let audit = MemoryAuditSink::new();
        let result = archive_folder_at(base, &FilterSet::new(), false, &audit, fixed_time())
            .expect("archive failed");

        assert_eq!((result.processed, result.skipped, result.failed), (0, 0, 1));
        assert!(!result.is_success());
        assert_eq!(
            fs::read_to_string(base.join("dup.txt")).expect("source should remain"),
            "new"
        );
        assert_eq!(
            fs::read_to_string(destination.join("dup.txt")).expect("destination kept"),
            "old"
        );
        assert!(audit
            .actions()
            .contains(&(AuditAction::FileMove, AuditStatus::Failed)));
    }

    #[test]
    fn test_regular_file_classifies_entries() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "a").expect("Failed to write file");
        fs::create_dir(temp_dir.path().join("sub")).expect("Failed to create dir");

        let mut files = Vec::new();
        let mut others = 0;
        for entry in fs::read_dir(temp_dir.path()).expect("read dir") {
            match regular_file(entry).expect("entry should be readable") {
                Some(path) => files.push(path),
                None => others += 1,
            }
        }
        assert_eq!(files, vec![file]);
        assert_eq!(others, 1);
    }

    #[test]
    fn test_unreadable_entry_is_reported() {
        let source = Path::new("/data/inbox");
        let unreadable = regular_file(Err(io::Error::other("listing broke")))
            .expect_err("listing error must surface");
        assert!(unreadable.path.is_none());

        let audit = MemoryAuditSink::new();
        report_unreadable(source, &unreadable, &audit, Instant::now());

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::FilterCheck);
        assert_eq!(events[0].status, AuditStatus::Error);
        assert_eq!(events[0].target, source);
        assert!(events[0].message.contains("listing broke"));
    }

    #[test]
    fn test_move_into_keeps_file_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file = temp_dir.path().join("keep.me");
        let dest = temp_dir.path().join("dest");
        fs::write(&file, "x").expect("Failed to write file");
        fs::create_dir(&dest).expect("Failed to create dir");

        let moved = move_into(&file, &dest).expect("move failed");
        assert_eq!(moved, dest.join("keep.me"));
        assert!(!file.exists());
        assert!(moved.exists());
    }

    #[test]
    fn test_run_continues_past_failures_without_strict() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let good = temp_dir.path().join("good");
        fs::create_dir(&good).expect("Failed to create dir");
        let missing = temp_dir.path().join("missing");

        let audit = MemoryAuditSink::new();
        let mut seen = Vec::new();
        let summary = run_archive(
            &[missing.clone(), good.clone()],
            &FilterSet::new(),
            RunOptions::default(),
            &audit,
            |outcome| seen.push(outcome.folder.clone()),
        );

        assert_eq!(seen, vec![missing, good]);
        assert_eq!(summary.outcomes.len(), 2);
        assert_eq!(summary.succeeded(), 1);
        assert!(!summary.aborted);
        assert!(!summary.is_success());
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_strict_run_stops_at_first_failure() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let good = temp_dir.path().join("good");
        fs::create_dir(&good).expect("Failed to create dir");
        let missing = temp_dir.path().join("missing");

        let audit = MemoryAuditSink::new();
        let summary = run_archive(
            &[missing, good.clone()],
            &FilterSet::new(),
            RunOptions {
                dry_run: false,
                strict: true,
            },
            &audit,
            |_| {},
        );

        assert_eq!(summary.outcomes.len(), 1);
        assert!(summary.aborted);
        assert_eq!(summary.exit_code(), 1);
        // The second folder was never touched.
        assert_eq!(fs::read_dir(&good).expect("read dir").count(), 0);
    }

    #[test]
    fn test_successful_run_exit_code() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let audit = MemoryAuditSink::new();
        let summary = run_archive(
            &[temp_dir.path()],
            &FilterSet::new(),
            RunOptions::default(),
            &audit,
            |_| {},
        );

        assert!(summary.is_success());
        assert_eq!(summary.exit_code(), 0);
    }
}
