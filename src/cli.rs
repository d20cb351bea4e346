//! Run orchestration for each command-line mode.
//!
//! The binary parses arguments and loads the configuration; everything after
//! that goes through [`run_cli`], which wires the organizer, the action log,
//! the watcher and the notifier together and prints results.

use crate::cancel::CancellationToken;
use crate::config::{Config, ConfigError};
use crate::history::{HistoryError, LogStore};
use crate::maintenance::MaintenanceReport;
use crate::mover::{OrganizeError, OrganizeResult};
use crate::notifier::{self, Notifier};
use crate::organizer::{FileOutcome, Organizer};
use crate::output::OutputFormatter;
use crate::summary::RunSummary;
use crate::undo::UndoManager;
use crate::watcher::{DownloadWatcher, WatchError, wait_until_stable};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Interval between size checks before a watched file is processed.
const STABILITY_INTERVAL: Duration = Duration::from_millis(250);
/// A file still growing after this many checks is left for a later event.
const STABILITY_ATTEMPTS: u32 = 20;

/// A CLI command to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizeCommand {
    /// Organize the current contents once, then run retention cleanup.
    Organize { dry_run: bool },
    /// Keep organizing new files until cancelled.
    Watch { dry_run: bool },
    /// Revert the most recent session.
    Undo { dry_run: bool },
    /// Retention cleanup only.
    Clean { dry_run: bool },
}

impl OrganizeCommand {
    pub fn dry_run(self) -> bool {
        match self {
            Self::Organize { dry_run }
            | Self::Watch { dry_run }
            | Self::Undo { dry_run }
            | Self::Clean { dry_run } => dry_run,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Organize(#[from] OrganizeError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error("No downloads directory given and none could be determined for this platform")]
    NoDownloadsDir,
    #[error("Cannot use {}: {source}", path.display())]
    InvalidDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

/// How a run ended when no fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    /// At least one file could not be handled.
    Incomplete,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        self == Self::Complete
    }
}

impl From<&RunSummary> for RunStatus {
    fn from(summary: &RunSummary) -> Self {
        if summary.has_failures() {
            Self::Incomplete
        } else {
            Self::Complete
        }
    }
}

/// Picks the downloads directory: the argument, then `downloads_dir` from
/// the config, then the platform default. The result is canonicalized.
pub fn resolve_base_path(dir: Option<&Path>, config: &Config) -> Result<PathBuf, RunError> {
    let path = dir
        .map(Path::to_path_buf)
        .or_else(|| config.downloads_dir.clone())
        .or_else(dirs::download_dir)
        .ok_or(RunError::NoDownloadsDir)?;

    let canonical = path
        .canonicalize()
        .map_err(|source| RunError::InvalidDirectory {
            path: path.clone(),
            source,
        })?;
    if !canonical.is_dir() {
        return Err(RunError::NotADirectory(canonical));
    }
    Ok(canonical)
}

/// Runs `command` against `base_path`.
///
/// `base_path` should come from [`resolve_base_path`]. The token only matters
/// for watch mode.
///
/// # Examples
///
/// ```no_run
/// use dlsort::cancel::CancellationToken;
/// use dlsort::cli::{OrganizeCommand, resolve_base_path, run_cli};
/// use dlsort::config::Config;
///
/// let config = Config::default();
/// let base = resolve_base_path(None, &config).unwrap();
/// let status = run_cli(
///     OrganizeCommand::Organize { dry_run: true },
///     &base,
///     &config,
///     &CancellationToken::new(),
/// )
/// .unwrap();
/// assert!(status.is_success());
/// ```
pub fn run_cli(
    command: OrganizeCommand,
    base_path: &Path,
    config: &Config,
    token: &CancellationToken,
) -> Result<RunStatus, RunError> {
    let dry_run = command.dry_run() || config.dry_run;
    let store = LogStore::new(config.log_path(base_path));
    let notifier = notifier::from_config(config);

    tracing::debug!(?command, dry_run, base = %base_path.display(), log = %store.path().display(), "starting");

    match command {
        OrganizeCommand::Organize { .. } => {
            organize_once(base_path, config, &store, dry_run, notifier.as_ref())
        }
        OrganizeCommand::Watch { .. } => {
            watch(base_path, config, &store, dry_run, notifier.as_ref(), token)
        }
        OrganizeCommand::Undo { .. } => undo(base_path, &store, dry_run),
        OrganizeCommand::Clean { .. } => clean(base_path, config, &store, dry_run, notifier.as_ref()),
    }
}

fn announce(action: &str, base_path: &Path, dry_run: bool) {
    let message = format!("{} {}", action, base_path.display());
    if dry_run {
        OutputFormatter::dry_run_notice(&message);
    } else {
        OutputFormatter::info(&message);
    }
}

fn organize_once(
    base_path: &Path,
    config: &Config,
    store: &LogStore,
    dry_run: bool,
    notifier: &dyn Notifier,
) -> Result<RunStatus, RunError> {
    announce("Organizing", base_path, dry_run);
    let mut organizer = Organizer::new(base_path, config, store, dry_run)?;
    let files = organizer.scan()?;

    if !files.is_empty() {
        let pb = OutputFormatter::create_progress_bar(files.len() as u64);
        let mut results = Vec::with_capacity(files.len());
        for path in files {
            pb.set_message(display_name(&path));
            let result = organizer.process_file(&path);
            results.push((path, result));
            pb.inc(1);
        }
        pb.finish_and_clear();

        for (path, result) in &results {
            report_outcome(base_path, path, result, dry_run);
        }
    }

    if let Some(report) = organizer.run_maintenance() {
        report_maintenance(base_path, &report, dry_run);
    }

    let summary = organizer.take_summary();
    OutputFormatter::summary_table(&summary);
    notifier.notify(&summary);

    if !dry_run && summary.total_moved() + summary.quarantined > 0 {
        OutputFormatter::plain(&format!(
            "Run 'dlsort {} --undo' to revert these moves.",
            base_path.display()
        ));
    }
    Ok(RunStatus::from(&summary))
}

fn watch(
    base_path: &Path,
    config: &Config,
    store: &LogStore,
    dry_run: bool,
    notifier: &dyn Notifier,
    token: &CancellationToken,
) -> Result<RunStatus, RunError> {
    let mut organizer = Organizer::new(base_path, config, store, dry_run)?;
    let watcher = DownloadWatcher::start(base_path, Duration::from_millis(config.settle_delay_ms))?;
    let mut total = RunSummary::new(dry_run);

    // Files that arrived while nothing was watching.
    for path in organizer.scan()? {
        let result = organizer.process_file(&path);
        report_outcome(base_path, &path, &result, dry_run);
    }
    if let Some(report) = organizer.run_maintenance() {
        report_maintenance(base_path, &report, dry_run);
    }
    finish_batch(&mut organizer, &mut total, notifier);

    announce("Watching", base_path, dry_run);
    OutputFormatter::plain("Press Ctrl+C to stop.");

    watcher.run(
        token,
        Duration::from_secs(config.watch_interval_secs),
        |batch| {
            for path in batch {
                if token.is_cancelled() {
                    break;
                }
                if !organizer.is_candidate(&path) {
                    continue;
                }
                if !wait_until_stable(&path, STABILITY_INTERVAL, STABILITY_ATTEMPTS) {
                    tracing::debug!(path = %path.display(), "file not stable, waiting for next event");
                    continue;
                }
                let result = organizer.process_file(&path);
                report_outcome(base_path, &path, &result, dry_run);
            }
            finish_batch(&mut organizer, &mut total, notifier);
        },
    )?;

    OutputFormatter::summary_table(&total);
    Ok(RunStatus::from(&total))
}

/// Notifies about the batch just processed and folds it into the running total.
fn finish_batch(organizer: &mut Organizer<'_>, total: &mut RunSummary, notifier: &dyn Notifier) {
    let batch = organizer.take_summary();
    if batch.is_empty() {
        return;
    }
    notifier.notify(&batch);
    total.merge(&batch);
}

fn undo(base_path: &Path, store: &LogStore, dry_run: bool) -> Result<RunStatus, RunError> {
    let report = UndoManager::undo(store, base_path, dry_run)?;
    OutputFormatter::undo_report(&report, dry_run);
    Ok(if report.is_complete_success() {
        RunStatus::Complete
    } else {
        RunStatus::Incomplete
    })
}

fn clean(
    base_path: &Path,
    config: &Config,
    store: &LogStore,
    dry_run: bool,
    notifier: &dyn Notifier,
) -> Result<RunStatus, RunError> {
    if config.retention_days == 0 {
        OutputFormatter::warning("retention_days is 0, cleanup is disabled.");
        return Ok(RunStatus::Complete);
    }

    announce("Cleaning", base_path, dry_run);
    let mut organizer = Organizer::new(base_path, config, store, dry_run)?;
    if let Some(report) = organizer.run_maintenance() {
        report_maintenance(base_path, &report, dry_run);
    }

    let summary = organizer.take_summary();
    OutputFormatter::summary_table(&summary);
    notifier.notify(&summary);
    Ok(RunStatus::from(&summary))
}

fn report_outcome(
    base_path: &Path,
    path: &Path,
    result: &OrganizeResult<FileOutcome>,
    dry_run: bool,
) {
    let name = display_name(path);
    match result {
        Ok(FileOutcome::Moved { destination, .. }) => {
            OutputFormatter::file_line(&name, &relative(base_path, destination), dry_run);
        }
        Ok(FileOutcome::DuplicateSkipped { existing }) => {
            OutputFormatter::warning(&format!(
                "{} duplicates {}, skipped",
                name,
                relative(base_path, existing)
            ));
        }
        Ok(FileOutcome::Quarantined {
            existing,
            destination,
        }) => {
            OutputFormatter::warning(&format!(
                "{} duplicates {}, moved to {}",
                name,
                relative(base_path, existing),
                relative(base_path, destination)
            ));
        }
        Err(e) => OutputFormatter::error(&e.to_string()),
    }
}

fn report_maintenance(base_path: &Path, report: &MaintenanceReport, dry_run: bool) {
    if report.is_empty() {
        return;
    }
    OutputFormatter::header(if dry_run { "Would clean up" } else { "Cleanup" });
    for path in &report.deleted {
        OutputFormatter::plain(&format!("  deleted {}", relative(base_path, path)));
    }
    for (from, to) in &report.trashed {
        OutputFormatter::plain(&format!(
            "  trashed {} → {}",
            relative(base_path, from),
            relative(base_path, to)
        ));
    }
    for (path, reason) in &report.failures {
        OutputFormatter::error(&format!("{}: {}", relative(base_path, path), reason));
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn relative(base_path: &Path, path: &Path) -> String {
    path.strip_prefix(base_path)
        .unwrap_or(path)
        .display()
        .to_string()
}
