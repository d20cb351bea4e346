//! Configuration loading and file filtering.
//!
//! A run is driven by a single [`Config`] loaded from a TOML file. The config
//! carries the extension to category mapping, the behavioral flags
//! (dry-run, date subfolders, retention, duplicate policy, watch timing) and
//! the filter rules that decide which files in the downloads directory are
//! candidates at all.
//!
//! # Configuration File Format
//!
//! ```toml
//! dry_run = false
//! use_date_subfolders = true
//! retention_days = 30
//! watch_interval_secs = 2
//! settle_delay_ms = 500
//! duplicate_policy = "skip"   # skip | rename | quarantine
//! trash_category = "Trash"
//! notify = true
//! notify_command = ["notify-send", "dlsort"]
//!
//! [category_map]
//! pdf = "Documents"
//! jpg = "Images"
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = ["desktop.ini"]
//! extensions = ["part", "crdownload"]
//! patterns = ["*.tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Name of the project-local configuration file.
pub const LOCAL_CONFIG_NAME: &str = ".dlsortrc.toml";

/// Default name of the action log, created inside the downloads directory.
pub const LOG_FILE_NAME: &str = ".dlsort_log.jsonl";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// No configuration file was given and none was found in the lookup locations.
    #[error("No configuration found; create one with --init-config (default location: {})", .0.display())]
    NoConfigFound(PathBuf),
    /// Invalid TOML syntax, structure or values.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// Refused to overwrite an existing configuration file.
    #[error("Configuration file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    /// IO error while reading or writing configuration.
    #[error("IO error on configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What to do with a file whose content already exists in its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Leave the file where it is and record the duplicate.
    #[default]
    Skip,
    /// Move it into the category anyway, under a `-duplicate` name.
    Rename,
    /// Move it into the top-level `Duplicates` folder.
    Quarantine,
}

/// Complete run configuration. Loaded once, then passed by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory to organize when none is given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads_dir: Option<PathBuf>,
    /// Compute every action but do not touch the filesystem.
    pub dry_run: bool,
    /// Place files under `Category/YYYY/MM` derived from their mtime.
    pub use_date_subfolders: bool,
    /// Files in category folders older than this are removed. `0` disables cleanup.
    pub retention_days: u32,
    /// How often the watch loop checks for a stop request, in seconds.
    pub watch_interval_secs: u64,
    /// Debounce delay for file-system events, in milliseconds.
    pub settle_delay_ms: u64,
    pub duplicate_policy: DuplicatePolicy,
    /// Move expired files here instead of deleting them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trash_category: Option<String>,
    /// Location of the action log. Relative paths resolve against the downloads directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub notify: bool,
    /// External command used for desktop notifications; the summary is appended as last argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_command: Option<Vec<String>>,
    /// File extension (without dot, case-insensitive) to category folder name.
    pub category_map: BTreeMap<String, String>,
    pub filters: FilterRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            downloads_dir: None,
            dry_run: false,
            use_date_subfolders: false,
            retention_days: 0,
            watch_interval_secs: 2,
            settle_delay_ms: 500,
            duplicate_policy: DuplicatePolicy::default(),
            trash_category: None,
            log_file: None,
            notify: true,
            notify_command: None,
            category_map: default_category_map(),
            filters: FilterRules::default(),
        }
    }
}

/// The built-in category table used when a config has no `category_map`.
pub fn default_category_map() -> BTreeMap<String, String> {
    const TABLE: &[(&str, &[&str])] = &[
        ("Images", &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"]),
        ("Documents", &["pdf", "doc", "docx", "txt", "csv", "xlsx", "pptx"]),
        ("Installers", &["exe", "msi", "dmg", "pkg"]),
        ("Archives", &["zip", "rar", "7z", "tar", "gz"]),
        ("Videos", &["mp4", "mov", "avi", "mkv", "wmv"]),
        ("Music", &["mp3", "wav", "aac", "flac"]),
    ];

    TABLE
        .iter()
        .flat_map(|(category, extensions)| {
            extensions
                .iter()
                .map(move |ext| (ext.to_string(), category.to_string()))
        })
        .collect()
}

impl Config {
    /// Load configuration.
    ///
    /// Lookup order:
    /// 1. `config_path`, if provided
    /// 2. `.dlsortrc.toml` in the current directory
    /// 3. `<config_dir>/dlsort/config.toml`
    ///
    /// Finding no file at all is an error.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_NAME);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        let user_config = Self::user_config_path();
        if user_config.exists() {
            return Self::load_from_file(&user_config);
        }

        Err(ConfigError::NoConfigFound(user_config))
    }

    /// Path of the per-user configuration file.
    pub fn user_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dlsort")
            .join("config.toml")
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default configuration to `path`, creating parent directories.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check values that TOML typing alone cannot rule out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (ext, category) in &self.category_map {
            if ext.trim_start_matches('.').is_empty() {
                return Err(ConfigError::ConfigInvalid(
                    "category_map contains an empty extension".to_string(),
                ));
            }
            validate_folder_name("category", category)?;
        }

        if let Some(trash) = &self.trash_category {
            validate_folder_name("trash_category", trash)?;
        }

        if self.watch_interval_secs == 0 {
            return Err(ConfigError::ConfigInvalid(
                "watch_interval_secs must be at least 1".to_string(),
            ));
        }

        if let Some(command) = &self.notify_command
            && command.is_empty()
        {
            return Err(ConfigError::ConfigInvalid(
                "notify_command must name a program".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the action log location for a downloads directory.
    pub fn log_path(&self, base_path: &Path) -> PathBuf {
        match &self.log_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base_path.join(path),
            None => base_path.join(LOG_FILE_NAME),
        }
    }

    /// Compile filter rules into matchers.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Category names become folder names, so they must be one plain path component.
fn validate_folder_name(field: &str, name: &str) -> Result<(), ConfigError> {
    let mut components = Path::new(name).components();
    let single_normal =
        matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none();

    if name.trim().is_empty() || !single_normal {
        return Err(ConfigError::ConfigInvalid(format!(
            "{} '{}' must be a single folder name",
            field, name
        )));
    }
    Ok(())
}

/// Filter rules deciding which files are organized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default = "ExcludeRules::in_progress_downloads")]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: false,
            exclude: ExcludeRules::in_progress_downloads(),
            include: IncludeRules::default(),
        }
    }
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "desktop.ini", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "part", "crdownload").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

impl ExcludeRules {
    /// Partial files written by browsers and download managers.
    pub fn in_progress_downloads() -> Self {
        Self {
            extensions: ["part", "crdownload", "download", "tmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Default::default()
        }
    }
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Pre-compiled filter rules.
#[derive(Debug)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Check if a file should be organized.
    ///
    /// Include patterns win outright; otherwise the file is dropped if it is
    /// hidden (unless enabled) or matches any filename, extension, glob or
    /// regex exclusion.
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path) || pattern.matches(&file_name))
        {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path) || pattern.matches(&file_name))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}
