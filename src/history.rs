/// Append-only action log.
///
/// Every filesystem action a run performs is written as one JSON object per
/// line, tagged with the run's session id. The log is never rewritten: undo
/// appends `restored` / `undo_skipped` entries that point back at the
/// session they revert.
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

static SESSION_SEQ: AtomicU32 = AtomicU32::new(0);

/// Identifies one run of the organizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// A fresh id from the current local time plus a process-local sequence number.
    pub fn new() -> Self {
        let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{}-{}",
            Local::now().format("%Y%m%dT%H%M%S%.6f"),
            seq
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// File moved into its category folder.
    Moved,
    /// Duplicate moved into the `Duplicates` folder.
    Quarantined,
    /// Duplicate left in place; destination is the existing copy.
    DuplicateSkipped,
    /// Expired file removed by maintenance.
    Deleted,
    /// Expired file moved into the trash category.
    Trashed,
    /// Undo moved a file back; `reverts` names the session.
    Restored,
    /// Undo gave up on an entry whose destination was gone.
    UndoSkipped,
}

impl ActionKind {
    /// Whether undo can move the file back.
    pub fn is_reversible(self) -> bool {
        matches!(self, Self::Moved | Self::Quarantined | Self::Trashed)
    }

    /// Whether this entry was written by undo.
    pub fn is_revert(self) -> bool {
        matches!(self, Self::Restored | Self::UndoSkipped)
    }
}

/// One recorded action. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub source_path: PathBuf,
    /// Absent for deletions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<PathBuf>,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverts: Option<SessionId>,
}

impl LogEntry {
    pub fn new(
        session_id: SessionId,
        action: ActionKind,
        source_path: &Path,
        destination_path: Option<&Path>,
    ) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            source_path: source_path.to_path_buf(),
            destination_path: destination_path.map(Path::to_path_buf),
            action,
            reverts: None,
        }
    }

    pub fn reverting(mut self, session: &SessionId) -> Self {
        self.reverts = Some(session.clone());
        self
    }
}

/// Errors reading or writing the action log.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to write log file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read log file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode log entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handle to the JSON-lines log file.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry as a single line.
    pub fn append(&self, entry: &LogEntry) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let write_error = |source| HistoryError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_error)?;
        file.write_all(line.as_bytes()).map_err(write_error)
    }

    /// Reads every entry in file order. A missing log is an empty log.
    ///
    /// Lines that fail to parse are reported and skipped so one damaged
    /// record does not make the whole history unusable.
    pub fn read_all(&self) -> Result<Vec<LogEntry>, HistoryError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| HistoryError::Read {
                path: self.path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    log = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "skipping malformed log line"
                ),
            }
        }
        Ok(entries)
    }
}

/// Records actions for one run. In dry-run mode nothing is written.
#[derive(Debug)]
pub struct Session<'a> {
    id: SessionId,
    store: &'a LogStore,
    dry_run: bool,
}

impl<'a> Session<'a> {
    pub fn start(store: &'a LogStore, dry_run: bool) -> Self {
        let id = SessionId::new();
        tracing::debug!(session = %id, dry_run, "session started");
        Self { id, store, dry_run }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn record(
        &self,
        action: ActionKind,
        source: &Path,
        destination: Option<&Path>,
    ) -> Result<(), HistoryError> {
        self.write(LogEntry::new(self.id.clone(), action, source, destination))
    }

    /// Records an undo action against `reverted`.
    pub fn record_revert(
        &self,
        action: ActionKind,
        source: &Path,
        destination: Option<&Path>,
        reverted: &SessionId,
    ) -> Result<(), HistoryError> {
        self.write(LogEntry::new(self.id.clone(), action, source, destination).reverting(reverted))
    }

    fn write(&self, entry: LogEntry) -> Result<(), HistoryError> {
        if self.dry_run {
            return Ok(());
        }
        self.store.append(&entry)
    }
}
