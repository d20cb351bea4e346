/// Moving files into category directories.
///
/// The [`Mover`] turns a category name into a destination directory
/// (optionally with `YYYY/MM` subfolders), picks a file name that does not
/// collide with anything on disk or already planned in this run, and then
/// performs the move unless running dry.
use crate::config::Config;
use crate::history::HistoryError;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while organizing a single file.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// Failed to create a category directory.
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to move a file to its destination.
    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to delete an expired file.
    #[error("Failed to delete {}: {source}", path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to read a file's metadata or contents.
    #[error("Failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The base directory path is invalid or doesn't exist.
    #[error("Invalid base path {}: {source}", path.display())]
    InvalidBasePath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Path has no final component to keep as the file name.
    #[error("{} has no file name", .0.display())]
    NoFileName(PathBuf),
    /// The action happened but could not be recorded.
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// A resolved move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Resolves destinations and moves files under a base directory.
#[derive(Debug)]
pub struct Mover {
    base_path: PathBuf,
    use_date_subfolders: bool,
    dry_run: bool,
    /// Destinations handed out this run; they count as taken even in dry-run.
    reserved: HashSet<PathBuf>,
}

impl Mover {
    pub fn new(base_path: &Path, config: &Config, dry_run: bool) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            use_date_subfolders: config.use_date_subfolders,
            dry_run,
            reserved: HashSet::new(),
        }
    }

    /// A mover that never adds date subfolders, used for flat folders like trash.
    pub fn flat(base_path: &Path, dry_run: bool) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            use_date_subfolders: false,
            dry_run,
            reserved: HashSet::new(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Directory a file of `category` modified at `modified` belongs in.
    pub fn destination_dir(&self, category: &str, modified: DateTime<Local>) -> PathBuf {
        let dir = self.base_path.join(category);
        if self.use_date_subfolders {
            dir.join(modified.format("%Y").to_string())
                .join(modified.format("%m").to_string())
        } else {
            dir
        }
    }

    /// Picks the first free name in `dir`: `name.ext`, then `name (1).ext`, `name (2).ext`, ...
    ///
    /// The returned path is reserved for the rest of the run.
    pub fn resolve_destination(&mut self, dir: &Path, file_name: &OsStr) -> PathBuf {
        let mut candidate = dir.join(file_name);
        let mut counter = 1u32;
        while self.is_taken(&candidate) {
            candidate = dir.join(suffixed_name(file_name, counter));
            counter += 1;
        }
        self.reserved.insert(candidate.clone());
        candidate
    }

    fn is_taken(&self, candidate: &Path) -> bool {
        self.reserved.contains(candidate) || candidate.symlink_metadata().is_ok()
    }

    /// Moves `source` into `dir` under `file_name`, resolving collisions.
    ///
    /// In dry-run mode the destination is resolved and reserved but nothing
    /// on disk changes.
    pub fn move_file(
        &mut self,
        source: &Path,
        dir: &Path,
        file_name: &OsStr,
    ) -> OrganizeResult<PlannedMove> {
        let destination = self.resolve_destination(dir, file_name);

        if !self.dry_run {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| OrganizeError::DirectoryCreationFailed {
                    path: dir.to_path_buf(),
                    source: e,
                })?;
            }
            move_path(source, &destination).map_err(|e| OrganizeError::FileMoveFailure {
                from: source.to_path_buf(),
                to: destination.clone(),
                source: e,
            })?;
        }

        tracing::debug!(
            from = %source.display(),
            to = %destination.display(),
            dry_run = self.dry_run,
            "moved file"
        );

        Ok(PlannedMove {
            source: source.to_path_buf(),
            destination,
        })
    }
}

/// Renames `from` to `to`, copying and removing when they sit on different filesystems.
pub(crate) fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            if let Err(e) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn split_name(file_name: &OsStr) -> (OsString, Option<OsString>) {
    let path = Path::new(file_name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => (stem.to_os_string(), Some(ext.to_os_string())),
        _ => (file_name.to_os_string(), None),
    }
}

fn join_name(mut stem: OsString, ext: Option<OsString>) -> OsString {
    if let Some(ext) = ext {
        stem.push(".");
        stem.push(ext);
    }
    stem
}

/// `report.pdf` with `n = 2` becomes `report (2).pdf`.
pub fn suffixed_name(file_name: &OsStr, n: u32) -> OsString {
    let (mut stem, ext) = split_name(file_name);
    stem.push(format!(" ({})", n));
    join_name(stem, ext)
}

/// `report.pdf` with tag `-duplicate` becomes `report-duplicate.pdf`.
pub fn tagged_name(file_name: &OsStr, tag: &str) -> OsString {
    let (mut stem, ext) = split_name(file_name);
    stem.push(tag);
    join_name(stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn mover(base: &Path, dry_run: bool) -> Mover {
        Mover::new(base, &Config::default(), dry_run)
    }

    #[test]
    fn test_suffixed_name_formats() {
        assert_eq!(suffixed_name(OsStr::new("report.pdf"), 1), "report (1).pdf");
        assert_eq!(suffixed_name(OsStr::new("archive.tar.gz"), 2), "archive.tar (2).gz");
        assert_eq!(suffixed_name(OsStr::new("README"), 3), "README (3)");
        assert_eq!(suffixed_name(OsStr::new(".bashrc"), 1), ".bashrc (1)");
    }

    #[test]
    fn test_tagged_name_formats() {
        assert_eq!(tagged_name(OsStr::new("a.txt"), "-duplicate"), "a-duplicate.txt");
        assert_eq!(tagged_name(OsStr::new("Makefile"), "-duplicate"), "Makefile-duplicate");
    }

    #[test]
    fn test_destination_dir_plain_and_dated() {
        let base = Path::new("/downloads");
        let modified = Local.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();

        let plain = mover(base, false);
        assert_eq!(
            plain.destination_dir("Documents", modified),
            base.join("Documents")
        );

        let config = Config {
            use_date_subfolders: true,
            ..Config::default()
        };
        let dated = Mover::new(base, &config, false);
        assert_eq!(
            dated.destination_dir("Documents", modified),
            base.join("Documents").join("2026").join("03")
        );
    }

    #[test]
    fn test_move_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let file = base.join("test.txt");
        fs::write(&file, "test content").unwrap();

        let dir = base.join("Documents");
        let planned = mover(base, false)
            .move_file(&file, &dir, OsStr::new("test.txt"))
            .unwrap();

        assert!(dir.is_dir());
        assert!(!file.exists());
        assert_eq!(planned.destination, dir.join("test.txt"));
        assert_eq!(fs::read_to_string(&planned.destination).unwrap(), "test content");
    }

    #[test]
    fn test_collision_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let dir = base.join("Documents");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("report.pdf"), "existing").unwrap();

        let mut mover = mover(base, false);
        let mut destinations = Vec::new();
        for i in 0..3 {
            let src_dir = base.join(format!("incoming{}", i));
            fs::create_dir(&src_dir).unwrap();
            let src = src_dir.join("report.pdf");
            fs::write(&src, format!("new {}", i)).unwrap();
            destinations.push(
                mover
                    .move_file(&src, &dir, OsStr::new("report.pdf"))
                    .unwrap()
                    .destination,
            );
        }

        assert_eq!(fs::read_to_string(dir.join("report.pdf")).unwrap(), "existing");
        assert_eq!(
            destinations,
            vec![
                dir.join("report (1).pdf"),
                dir.join("report (2).pdf"),
                dir.join("report (3).pdf"),
            ]
        );
    }

    #[test]
    fn test_dry_run_reserves_distinct_paths_without_touching_disk() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let file = base.join("a.txt");
        fs::write(&file, "content").unwrap();
        let dir = base.join("Documents");

        let mut mover = mover(base, true);
        let first = mover.move_file(&file, &dir, OsStr::new("a.txt")).unwrap();
        let second = mover.move_file(&file, &dir, OsStr::new("a.txt")).unwrap();

        assert_ne!(first.destination, second.destination);
        assert!(file.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_move_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let result = mover(base, false).move_file(
            &base.join("ghost.txt"),
            &base.join("Documents"),
            OsStr::new("ghost.txt"),
        );
        assert!(matches!(result, Err(OrganizeError::FileMoveFailure { .. })));
    }
}
