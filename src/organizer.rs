//! The classify → detect-duplicate → move pipeline shared by one-shot and watch runs.

use crate::classifier::{Classifier, DUPLICATES_CATEGORY};
use crate::config::{CompiledFilters, Config, ConfigError, DuplicatePolicy};
use crate::duplicates::DuplicateDetector;
use crate::file_entry::FileEntry;
use crate::history::{ActionKind, LogStore, Session};
use crate::maintenance::{Maintenance, MaintenanceReport};
use crate::mover::{Mover, OrganizeError, OrganizeResult, tagged_name};
use crate::summary::RunSummary;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// What happened to one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Moved (or, in dry-run, would be moved) into `category`.
    Moved {
        category: String,
        destination: PathBuf,
    },
    /// Left in place because `existing` has the same content.
    DuplicateSkipped { existing: PathBuf },
    /// Moved into the `Duplicates` folder because `existing` has the same content.
    Quarantined {
        existing: PathBuf,
        destination: PathBuf,
    },
}

/// One organizing session over a downloads directory.
pub struct Organizer<'a> {
    base_path: PathBuf,
    config: &'a Config,
    log_path: PathBuf,
    classifier: Classifier,
    filters: CompiledFilters,
    detector: DuplicateDetector,
    mover: Mover,
    session: Session<'a>,
    /// Destinations placed by this session; maintenance leaves them alone.
    placed: HashSet<PathBuf>,
    summary: RunSummary,
}

impl<'a> Organizer<'a> {
    /// Prepares a session. `dry_run` is the effective flag (config or command line).
    pub fn new(
        base_path: &Path,
        config: &'a Config,
        store: &'a LogStore,
        dry_run: bool,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            base_path: base_path.to_path_buf(),
            config,
            log_path: store.path().to_path_buf(),
            classifier: Classifier::new(&config.category_map),
            filters: config.compile_filters()?,
            detector: DuplicateDetector::new(),
            mover: Mover::new(base_path, config, dry_run),
            session: Session::start(store, dry_run),
            placed: HashSet::new(),
            summary: RunSummary::new(dry_run),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn session(&self) -> &Session<'a> {
        &self.session
    }

    pub fn is_dry_run(&self) -> bool {
        self.session.is_dry_run()
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Returns the counts gathered so far and starts a fresh tally.
    pub fn take_summary(&mut self) -> RunSummary {
        let dry_run = self.is_dry_run();
        std::mem::replace(&mut self.summary, RunSummary::new(dry_run))
    }

    /// Whether `path` is a top-level file of the downloads directory that should be organized.
    pub fn is_candidate(&self, path: &Path) -> bool {
        path.parent() == Some(self.base_path.as_path())
            && path != self.log_path
            && path.is_file()
            && self.filters.should_include(path)
    }

    /// Lists candidate files, sorted by name.
    pub fn scan(&self) -> OrganizeResult<Vec<PathBuf>> {
        let entries =
            fs::read_dir(&self.base_path).map_err(|e| OrganizeError::InvalidBasePath {
                path: self.base_path.clone(),
                source: e,
            })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .map(|entry| entry.path())
            .filter(|path| self.is_candidate(path))
            .collect();
        files.sort();

        tracing::debug!(count = files.len(), base = %self.base_path.display(), "scanned");
        Ok(files)
    }

    /// Runs one file through the pipeline and updates the summary.
    pub fn process_file(&mut self, path: &Path) -> OrganizeResult<FileOutcome> {
        let result = self.organize(path);
        match &result {
            Ok(FileOutcome::Moved { category, .. }) => self.summary.record_move(category),
            Ok(FileOutcome::DuplicateSkipped { .. }) => self.summary.duplicates_skipped += 1,
            Ok(FileOutcome::Quarantined { .. }) => self.summary.quarantined += 1,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not organize file");
                self.summary.failed += 1;
            }
        }
        result
    }

    fn organize(&mut self, path: &Path) -> OrganizeResult<FileOutcome> {
        let entry = FileEntry::from_path(path).map_err(|e| OrganizeError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file_name = entry
            .file_name()
            .ok_or_else(|| OrganizeError::NoFileName(path.to_path_buf()))?
            .to_os_string();

        let category = self
            .classifier
            .classify(entry.extension.as_deref())
            .to_string();
        let category_root = self.base_path.join(&category);

        let duplicate = self
            .detector
            .find_duplicate(&entry, &category_root)
            .map_err(|e| OrganizeError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            })?;

        let Some(existing) = duplicate else {
            let dir = self.mover.destination_dir(&category, entry.modified_local());
            let destination = self.place(&entry, &category_root, &dir, &file_name)?;
            return Ok(FileOutcome::Moved {
                category,
                destination,
            });
        };

        tracing::info!(
            path = %path.display(),
            existing = %existing.display(),
            policy = ?self.config.duplicate_policy,
            "duplicate detected"
        );

        match self.config.duplicate_policy {
            DuplicatePolicy::Skip => {
                self.session
                    .record(ActionKind::DuplicateSkipped, path, Some(&existing))?;
                Ok(FileOutcome::DuplicateSkipped { existing })
            }
            DuplicatePolicy::Rename => {
                let dir = self.mover.destination_dir(&category, entry.modified_local());
                let renamed = tagged_name(&file_name, "-duplicate");
                let destination = self.place(&entry, &category_root, &dir, &renamed)?;
                Ok(FileOutcome::Moved {
                    category,
                    destination,
                })
            }
            DuplicatePolicy::Quarantine => {
                let dir = self.base_path.join(DUPLICATES_CATEGORY);
                let planned = self.mover.move_file(path, &dir, &file_name)?;
                self.placed.insert(planned.destination.clone());
                self.session.record(
                    ActionKind::Quarantined,
                    path,
                    Some(&planned.destination),
                )?;
                Ok(FileOutcome::Quarantined {
                    existing,
                    destination: planned.destination,
                })
            }
        }
    }

    /// Moves into a category folder, indexes the result and logs it.
    fn place(
        &mut self,
        entry: &FileEntry,
        category_root: &Path,
        dir: &Path,
        file_name: &OsStr,
    ) -> OrganizeResult<PathBuf> {
        let planned = self.mover.move_file(&entry.path, dir, file_name)?;

        let content_path = if self.is_dry_run() {
            &entry.path
        } else {
            &planned.destination
        };
        self.detector
            .record(category_root, entry, &planned.destination, content_path);
        self.placed.insert(planned.destination.clone());

        self.session
            .record(ActionKind::Moved, &entry.path, Some(&planned.destination))?;
        Ok(planned.destination)
    }

    /// Category folders that maintenance looks after.
    pub fn managed_categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .classifier
            .categories()
            .into_iter()
            .map(str::to_string)
            .collect();
        categories.push(DUPLICATES_CATEGORY.to_string());
        categories
    }

    /// `base/<category>` for a path somewhere inside a category folder.
    fn category_root_of(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let category = relative.components().next()?;
        Some(self.base_path.join(category))
    }

    /// Runs the retention pass if `retention_days` is set.
    pub fn run_maintenance(&mut self) -> Option<MaintenanceReport> {
        if self.config.retention_days == 0 {
            return None;
        }

        let categories = self.managed_categories();
        let report = Maintenance::new(
            &self.base_path,
            self.config.retention_days,
            self.config.trash_category.as_deref(),
            &self.placed,
        )
        .run(
            categories.iter().map(String::as_str),
            &self.session,
            SystemTime::now(),
        );

        let expired = report
            .deleted
            .iter()
            .chain(report.trashed.iter().map(|(from, _)| from));
        for path in expired {
            if let Some(root) = self.category_root_of(path) {
                self.detector.forget(&root, path);
            }
        }

        self.summary.deleted += report.deleted.len();
        self.summary.trashed += report.trashed.len();
        self.summary.failed += report.failures.len();
        Some(report)
    }
}
