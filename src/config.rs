//! Settings loading and filter compilation.
//!
//! Settings are read from a JSON file (or TOML, when the file name ends in
//! `.toml`) and merged with command-line overrides before being compiled into
//! a [`FilterSet`].
//!
//! # Settings File Format
//!
//! ```json
//! {
//!   "default_filters": {
//!     "extensions": [".pdf", ".docx"],
//!     "size_limit": "100MB",
//!     "min_size": "1KB",
//!     "modified_days": 30,
//!     "created_days": 30,
//!     "regex": "^report_",
//!     "exclude": ["draft", "~$"]
//!   },
//!   "folders": [{ "path": "/home/user/Downloads" }],
//!   "logging": {
//!     "verbose": false,
//!     "enable_audit_log": true,
//!     "audit_log": "audit_logs/archive_audit.jsonl"
//!   }
//! }
//! ```

use crate::filter::{FilterSet, normalize_extension};
use crate::size::{SizeError, parse_size};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings file used when none is given explicitly.
pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Audit log location used when the settings do not name one.
pub const DEFAULT_AUDIT_LOG: &str = "audit_logs/archive_audit.jsonl";

/// Errors that can occur while loading settings or compiling filters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file not found at an explicitly given path.
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The settings file could not be read.
    #[error("failed to read settings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Invalid JSON/TOML syntax or structure.
    #[error("invalid settings file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    /// A size constraint could not be parsed.
    #[error("invalid {field}: {source}")]
    InvalidSize {
        field: &'static str,
        #[source]
        source: SizeError,
    },
    /// The name pattern is not a valid regular expression.
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
    /// Neither the settings nor the command line named a folder.
    #[error("no folders to process")]
    NoFolders,
}

/// A size given either as a byte count or a human-readable string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSetting {
    Bytes(u64),
    Text(String),
}

impl SizeSetting {
    fn to_bytes(&self, field: &'static str) -> Result<u64, ConfigError> {
        match self {
            SizeSetting::Bytes(bytes) => Ok(*bytes),
            SizeSetting::Text(text) => {
                parse_size(text).map_err(|source| ConfigError::InvalidSize { field, source })
            }
        }
    }
}

/// Raw, uncompiled filter settings.
///
/// Field names follow the settings file keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub size_limit: Option<SizeSetting>,
    #[serde(default)]
    pub min_size: Option<SizeSetting>,
    #[serde(default)]
    pub modified_days: Option<u32>,
    #[serde(default)]
    pub created_days: Option<u32>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

impl FilterConfig {
    /// Replaces every field that is set in `overrides`.
    pub fn merge(&mut self, overrides: FilterConfig) {
        if overrides.extensions.is_some() {
            self.extensions = overrides.extensions;
        }
        if overrides.size_limit.is_some() {
            self.size_limit = overrides.size_limit;
        }
        if overrides.min_size.is_some() {
            self.min_size = overrides.min_size;
        }
        if overrides.modified_days.is_some() {
            self.modified_days = overrides.modified_days;
        }
        if overrides.created_days.is_some() {
            self.created_days = overrides.created_days;
        }
        if overrides.regex.is_some() {
            self.regex = overrides.regex;
        }
        if overrides.exclude.is_some() {
            self.exclude = overrides.exclude;
        }
    }

    /// Validates the settings and compiles them into a [`FilterSet`].
    ///
    /// Sizes of zero and empty lists or patterns mean "no constraint".
    ///
    /// # Errors
    ///
    /// Returns an error if a size cannot be parsed or the regex is invalid.
    pub fn compile(&self) -> Result<FilterSet, ConfigError> {
        let mut filters = FilterSet::new();

        if let Some(extensions) = &self.extensions {
            let normalized: Vec<String> = extensions
                .iter()
                .filter_map(|ext| normalize_extension(ext))
                .collect();
            if !normalized.is_empty() {
                filters = filters.with_extensions(normalized);
            }
        }

        if let Some(size_limit) = &self.size_limit {
            let bytes = size_limit.to_bytes("size_limit")?;
            if bytes > 0 {
                filters = filters.with_size_limit(bytes);
            }
        }

        if let Some(min_size) = &self.min_size {
            let bytes = min_size.to_bytes("min_size")?;
            if bytes > 0 {
                filters = filters.with_min_size(bytes);
            }
        }

        if let Some(days) = self.modified_days {
            filters = filters.with_modified_within_days(days);
        }

        if let Some(days) = self.created_days {
            filters = filters.with_created_within_days(days);
        }

        if let Some(pattern) = self.regex.as_deref().filter(|p| !p.is_empty()) {
            let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            filters = filters.with_name_pattern(regex);
        }

        if let Some(exclude) = &self.exclude {
            filters = filters.with_exclude_substrings(
                exclude
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }

        Ok(filters)
    }
}

/// A folder entry in the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Logging section of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_enable_audit_log")]
    pub enable_audit_log: bool,
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
}

fn default_enable_audit_log() -> bool {
    true
}

fn default_audit_log() -> PathBuf {
    PathBuf::from(DEFAULT_AUDIT_LOG)
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            verbose: false,
            enable_audit_log: default_enable_audit_log(),
            audit_log: default_audit_log(),
        }
    }
}

/// Contents of a settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub default_filters: FilterConfig,
    #[serde(default)]
    pub folders: Vec<FolderEntry>,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Loads settings for a run.
    ///
    /// An explicitly given path must exist. Without one, `settings.json` in the
    /// current directory is used if present, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or if any file that is
    /// found cannot be read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let default_path = Path::new(DEFAULT_SETTINGS_FILE);
        if default_path.exists() {
            return Self::load_from_file(default_path);
        }

        Ok(Self::default())
    }

    /// Loads settings from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the file does not exist,
    /// `ConfigError::Io` if it cannot be read and `ConfigError::Parse` if
    /// its contents are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    }

    /// Folder paths configured in the settings, skipping entries without a
    /// path.
    pub fn folder_paths(&self) -> Vec<PathBuf> {
        self.folders
            .iter()
            .filter_map(|entry| entry.path.clone())
            .collect()
    }
}

/// Builds the ordered folder list: configured folders first, then
/// command-line folders.
///
/// # Errors
///
/// Returns `ConfigError::NoFolders` when the combined list is empty.
pub fn resolve_folders(
    settings: Option<&Settings>,
    cli_folders: &[PathBuf],
) -> Result<Vec<PathBuf>, ConfigError> {
    let mut folders = settings.map(Settings::folder_paths).unwrap_or_default();
    folders.extend(cli_folders.iter().cloned());

    if folders.is_empty() {
        return Err(ConfigError::NoFolders);
    }
    Ok(folders)
}

/// Splits a comma-separated list, trimming items and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Decision, FileRecord};
    use chrono::{Duration, Local};
    use tempfile::TempDir;

    fn record(name: &str, size: u64) -> FileRecord {
        let old = Local::now() - Duration::days(365);
        FileRecord {
            path: PathBuf::from(name),
            file_name: name.to_string(),
            size,
            modified: old,
            created: old,
        }
    }

    #[test]
    fn test_default_settings_have_no_filters() {
        let settings = Settings::default();
        assert_eq!(settings.default_filters, FilterConfig::default());
        assert!(settings.folders.is_empty());
        assert!(settings.logging.enable_audit_log);
        assert_eq!(settings.logging.audit_log, PathBuf::from(DEFAULT_AUDIT_LOG));

        let filters = settings.default_filters.compile().expect("compile failed");
        assert!(filters.extensions.is_none());
        assert!(filters.size_limit.is_none());
        assert!(filters.name_pattern.is_none());
        assert!(filters.exclude_substrings.is_empty());
    }

    #[test]
    fn test_load_json_settings() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
                "default_filters": {
                    "extensions": ["PDF", ".docx"],
                    "size_limit": "10MB",
                    "min_size": 512,
                    "modified_days": 7,
                    "regex": "^report",
                    "exclude": ["draft"]
                },
                "folders": [{"path": "/tmp/a"}, {"name": "no path"}, {"path": "/tmp/b"}],
                "logging": {"verbose": true}
            }"#,
        )
        .expect("Failed to write settings");

        let settings = Settings::load(Some(path.as_path())).expect("load failed");
        assert_eq!(
            settings.folder_paths(),
            vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]
        );
        assert!(settings.logging.verbose);
        assert!(settings.logging.enable_audit_log);

        let filters = settings.default_filters.compile().expect("compile failed");
        let extensions = filters.extensions.clone().expect("extensions set");
        assert!(extensions.contains(".pdf"));
        assert!(extensions.contains(".docx"));
        assert_eq!(filters.size_limit, Some(10 * 1024 * 1024));
        assert_eq!(filters.min_size, Some(512));
        assert_eq!(filters.modified_within_days, Some(7));
        assert_eq!(filters.exclude_substrings, vec!["draft".to_string()]);
    }

    #[test]
    fn test_load_toml_settings() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("archive.toml");
        fs::write(
            &path,
            r#"
[default_filters]
extensions = ["log"]
size_limit = "1KB"

[[folders]]
path = "/var/tmp/inbox"

[logging]
enable_audit_log = false
"#,
        )
        .expect("Failed to write settings");

        let settings = Settings::load(Some(path.as_path())).expect("load failed");
        assert_eq!(settings.folder_paths(), vec![PathBuf::from("/var/tmp/inbox")]);
        assert!(!settings.logging.enable_audit_log);

        let filters = settings.default_filters.compile().expect("compile failed");
        assert_eq!(filters.size_limit, Some(1024));
        assert_eq!(filters.check(&record("x.log", 10), Local::now()), Decision::Admit);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/non/existent/settings.json")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{ not json").expect("Failed to write settings");

        assert!(matches!(
            Settings::load(Some(path.as_path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_negative_days_are_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, r#"{"default_filters": {"modified_days": -3}}"#)
            .expect("Failed to write settings");

        assert!(matches!(
            Settings::load(Some(path.as_path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_merge_overrides_only_set_fields() {
        let mut base = FilterConfig {
            extensions: Some(vec![".txt".to_string()]),
            size_limit: Some(SizeSetting::Text("1MB".to_string())),
            exclude: Some(vec!["keep".to_string()]),
            ..Default::default()
        };
        base.merge(FilterConfig {
            extensions: Some(vec![".csv".to_string()]),
            modified_days: Some(3),
            ..Default::default()
        });

        assert_eq!(base.extensions, Some(vec![".csv".to_string()]));
        assert_eq!(base.size_limit, Some(SizeSetting::Text("1MB".to_string())));
        assert_eq!(base.modified_days, Some(3));
        assert_eq!(base.exclude, Some(vec!["keep".to_string()]));
    }

    #[test]
    fn test_zero_and_empty_values_mean_no_constraint() {
        let config = FilterConfig {
            extensions: Some(vec![" ".to_string()]),
            size_limit: Some(SizeSetting::Text(String::new())),
            min_size: Some(SizeSetting::Bytes(0)),
            regex: Some(String::new()),
            exclude: Some(vec![String::new()]),
            ..Default::default()
        };
        let filters = config.compile().expect("compile failed");

        assert!(filters.extensions.is_none());
        assert!(filters.size_limit.is_none());
        assert!(filters.min_size.is_none());
        assert!(filters.name_pattern.is_none());
        assert!(filters.exclude_substrings.is_empty());
    }

    #[test]
    fn test_invalid_size_is_reported_with_field() {
        let config = FilterConfig {
            min_size: Some(SizeSetting::Text("10XB".to_string())),
            ..Default::default()
        };
        match config.compile() {
            Err(ConfigError::InvalidSize { field, .. }) => assert_eq!(field, "min_size"),
            other => panic!("expected InvalidSize, got {:?}", other),
        }
    }

    #[test]
    fn test_huge_day_counts_compile_and_reject_real_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("report.txt");
        fs::write(&path, "content").expect("Failed to write file");

        let config = FilterConfig {
            modified_days: Some(u32::MAX),
            ..Default::default()
        };
        let filters = config.compile().expect("compile failed");
        let audit = crate::audit::MemoryAuditSink::new();

        let decision = crate::filter::evaluate(&path, &filters, &audit).expect("evaluation failed");
        assert!(!decision.is_admit());
        assert_eq!(audit.events().len(), 1);
    }

    #[test]
    fn test_invalid_regex_returns_error() {
        let config = FilterConfig {
            regex: Some("[invalid(".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.compile(),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_resolve_folders_order_and_empty() {
        let settings = Settings {
            folders: vec![FolderEntry {
                path: Some(PathBuf::from("/from/config")),
            }],
            ..Default::default()
        };
        let folders = resolve_folders(Some(&settings), &[PathBuf::from("/from/cli")])
            .expect("resolve failed");
        assert_eq!(
            folders,
            vec![PathBuf::from("/from/config"), PathBuf::from("/from/cli")]
        );

        assert!(matches!(
            resolve_folders(None, &[]),
            Err(ConfigError::NoFolders)
        ));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" .pdf, .docx ,,"),
            vec![".pdf".to_string(), ".docx".to_string()]
        );
        assert!(split_list("").is_empty());
    }
}
