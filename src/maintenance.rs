//! Retention cleanup for organized folders.
//!
//! Files in category folders whose modification time is older than the
//! retention window are deleted, or moved into the trash category when one is
//! configured. Directories emptied by that are removed, up to and including
//! the category folder.

use crate::history::{ActionKind, Session};
use crate::mover::{Mover, OrganizeError, OrganizeResult};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// What a cleanup pass did (or would do, in dry-run mode).
#[derive(Debug, Default)]
pub struct MaintenanceReport {
    pub deleted: Vec<PathBuf>,
    /// `(from, to)` pairs of files moved into the trash category.
    pub trashed: Vec<(PathBuf, PathBuf)>,
    pub removed_dirs: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

impl MaintenanceReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
            && self.trashed.is_empty()
            && self.removed_dirs.is_empty()
            && self.failures.is_empty()
    }
}

/// One retention pass over a set of category folders.
pub struct Maintenance<'a> {
    base_path: &'a Path,
    retention: Duration,
    trash_category: Option<&'a str>,
    /// Files placed by the current run; never expired in the same run.
    protected: &'a HashSet<PathBuf>,
}

impl<'a> Maintenance<'a> {
    pub fn new(
        base_path: &'a Path,
        retention_days: u32,
        trash_category: Option<&'a str>,
        protected: &'a HashSet<PathBuf>,
    ) -> Self {
        Self {
            base_path,
            retention: Duration::from_secs(u64::from(retention_days) * SECONDS_PER_DAY),
            trash_category,
            protected,
        }
    }

    /// Expires old files under `base/<category>` for each of `categories`.
    ///
    /// The trash category itself is never scanned. Per-file failures are
    /// collected in the report; the pass always completes.
    pub fn run<'c>(
        &self,
        categories: impl IntoIterator<Item = &'c str>,
        session: &Session<'_>,
        now: SystemTime,
    ) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        let Some(cutoff) = now.checked_sub(self.retention) else {
            return report;
        };
        let dry_run = session.is_dry_run();
        let mut trash_mover = Mover::flat(self.base_path, dry_run);

        let roots: Vec<PathBuf> = categories
            .into_iter()
            .filter(|category| Some(*category) != self.trash_category)
            .map(|category| self.base_path.join(category))
            .filter(|root| root.is_dir())
            .collect();

        let mut vacated: Vec<PathBuf> = Vec::new();
        for root in &roots {
            for path in expired_files(root, cutoff) {
                if self.protected.contains(&path) {
                    continue;
                }
                match self.expire(&path, &mut trash_mover, session) {
                    Ok(outcome) => {
                        if let Some(parent) = path.parent() {
                            vacated.push(parent.to_path_buf());
                        }
                        match outcome {
                            Some(destination) => report.trashed.push((path, destination)),
                            None => report.deleted.push(path),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "cleanup failed");
                        report.failures.push((path, e.to_string()));
                    }
                }
            }
        }

        if !dry_run {
            for dir in vacated {
                report
                    .removed_dirs
                    .extend(prune_empty_ancestors(&dir, self.base_path));
            }
        }

        tracing::info!(
            deleted = report.deleted.len(),
            trashed = report.trashed.len(),
            removed_dirs = report.removed_dirs.len(),
            failures = report.failures.len(),
            "cleanup finished"
        );
        report
    }

    /// Deletes or trashes one file. Returns the trash destination, if any.
    fn expire(
        &self,
        path: &Path,
        trash_mover: &mut Mover,
        session: &Session<'_>,
    ) -> OrganizeResult<Option<PathBuf>> {
        match self.trash_category {
            Some(trash) => {
                let file_name = path
                    .file_name()
                    .ok_or_else(|| OrganizeError::NoFileName(path.to_path_buf()))?;
                let planned =
                    trash_mover.move_file(path, &self.base_path.join(trash), file_name)?;
                session.record(ActionKind::Trashed, path, Some(&planned.destination))?;
                Ok(Some(planned.destination))
            }
            None => {
                if !session.is_dry_run() {
                    fs::remove_file(path).map_err(|e| OrganizeError::DeleteFailed {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                }
                session.record(ActionKind::Deleted, path, None)?;
                Ok(None)
            }
        }
    }
}

/// Files under `root` last modified before `cutoff`, in walk order.
fn expired_files(root: &Path, cutoff: SystemTime) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .is_some_and(|modified| modified < cutoff)
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Removes `start` and then its parents while they are empty, stopping at `stop_at`.
pub fn prune_empty_ancestors(start: &Path, stop_at: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir == stop_at || !dir.starts_with(stop_at) {
            break;
        }
        if !is_empty_dir(dir).unwrap_or(false) || fs::remove_dir(dir).is_err() {
            break;
        }
        removed.push(dir.to_path_buf());
        current = dir.parent();
    }
    removed
}

fn is_empty_dir(dir: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}
