/// Undo functionality for reverting a previous run.
///
/// The log is folded into the set of reversible entries that no later undo
/// has dealt with yet, grouped by session. The newest session with anything
/// pending is then replayed backwards: each file moves from its destination
/// back to its source, newest move first.
use crate::history::{ActionKind, HistoryError, LogEntry, LogStore, Session, SessionId};
use crate::maintenance::prune_empty_ancestors;
use crate::mover::move_path;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Represents the result of an undo operation.
#[derive(Debug, Default)]
pub struct UndoReport {
    /// Session that was reverted, `None` when there was nothing to undo.
    pub session: Option<SessionId>,
    /// Number of files successfully restored.
    pub restored_files: usize,
    /// Files left in place because their original location is occupied or the move failed.
    pub failed_restores: Vec<(PathBuf, String)>,
    /// Entries whose destination no longer exists.
    pub skipped_files: Vec<(PathBuf, String)>,
}

impl UndoReport {
    /// Returns the total number of operations processed.
    pub fn total_processed(&self) -> usize {
        self.restored_files + self.failed_restores.len() + self.skipped_files.len()
    }

    /// Returns true if nothing failed. Skipped entries do not count as failures.
    pub fn is_complete_success(&self) -> bool {
        self.failed_restores.is_empty()
    }

    pub fn nothing_to_undo(&self) -> bool {
        self.session.is_none()
    }
}

/// Reversible entries still awaiting undo, oldest session first.
#[derive(Debug, Default)]
struct PendingLedger {
    order: Vec<SessionId>,
    pending: HashMap<SessionId, Vec<LogEntry>>,
}

impl PendingLedger {
    fn apply(mut self, entry: &LogEntry) -> Self {
        if entry.action.is_reversible() {
            if !self.pending.contains_key(&entry.session_id) {
                self.order.push(entry.session_id.clone());
            }
            self.pending
                .entry(entry.session_id.clone())
                .or_default()
                .push(entry.clone());
        } else if entry.action.is_revert()
            && let Some(reverted) = &entry.reverts
            && let Some(entries) = self.pending.get_mut(reverted)
        {
            // An undo entry's source is the forward entry's destination.
            if let Some(index) = entries
                .iter()
                .rposition(|e| e.destination_path.as_deref() == Some(entry.source_path.as_path()))
            {
                entries.remove(index);
            }
        }
        self
    }

    fn latest(mut self) -> Option<(SessionId, Vec<LogEntry>)> {
        while let Some(session) = self.order.pop() {
            if let Some(entries) = self.pending.remove(&session)
                && !entries.is_empty()
            {
                return Some((session, entries));
            }
        }
        None
    }
}

/// Picks the most recent session with pending reversible entries.
///
/// The returned entries are in undo order (newest first).
pub fn plan_undo(entries: &[LogEntry]) -> Option<(SessionId, Vec<LogEntry>)> {
    entries
        .iter()
        .fold(PendingLedger::default(), PendingLedger::apply)
        .latest()
        .map(|(session, mut entries)| {
            entries.reverse();
            (session, entries)
        })
}

/// The disk as a dry-run undo would have left it so far.
///
/// Real runs never record anything here, so lookups fall through to the disk.
#[derive(Debug, Default)]
struct PlannedLayout {
    vacated: HashSet<PathBuf>,
    filled: HashSet<PathBuf>,
}

impl PlannedLayout {
    fn is_occupied(&self, path: &Path) -> bool {
        self.filled.contains(path)
            || (!self.vacated.contains(path) && path.symlink_metadata().is_ok())
    }

    fn plan_move(&mut self, from: &Path, to: &Path) {
        self.filled.remove(from);
        self.vacated.insert(from.to_path_buf());
        self.vacated.remove(to);
        self.filled.insert(to.to_path_buf());
    }
}

enum RestoreOutcome {
    Restored,
    Skipped(String),
    Failed(String),
}

/// Manages undo operations for file organization.
pub struct UndoManager;

impl UndoManager {
    /// Undoes the most recent run recorded in `store`.
    ///
    /// Entries are handled one by one; a missing destination is skipped and
    /// an occupied source is reported as failed and left for a later
    /// attempt, and neither stops the rest of the session. Directories under
    /// `base_path` emptied by the restore are removed afterwards.
    ///
    /// With `dry_run` nothing is moved or written; the report shows what
    /// would happen.
    pub fn undo(
        store: &LogStore,
        base_path: &Path,
        dry_run: bool,
    ) -> Result<UndoReport, HistoryError> {
        let entries = store.read_all()?;
        let Some((target, pending)) = plan_undo(&entries) else {
            tracing::info!(log = %store.path().display(), "nothing to undo");
            return Ok(UndoReport::default());
        };

        tracing::info!(session = %target, entries = pending.len(), dry_run, "undoing session");
        let session = Session::start(store, dry_run);
        let mut report = UndoReport {
            session: Some(target.clone()),
            ..Default::default()
        };
        let mut vacated_dirs: Vec<PathBuf> = Vec::new();
        let mut layout = PlannedLayout::default();

        for entry in &pending {
            let Some(destination) = entry.destination_path.as_deref() else {
                continue;
            };

            match Self::restore_file(destination, &entry.source_path, dry_run, &mut layout) {
                RestoreOutcome::Restored => {
                    report.restored_files += 1;
                    if let Some(parent) = destination.parent() {
                        vacated_dirs.push(parent.to_path_buf());
                    }
                    Self::record(
                        &session,
                        ActionKind::Restored,
                        destination,
                        &entry.source_path,
                        &target,
                    );
                }
                RestoreOutcome::Skipped(reason) => {
                    Self::record(
                        &session,
                        ActionKind::UndoSkipped,
                        destination,
                        &entry.source_path,
                        &target,
                    );
                    report.skipped_files.push((destination.to_path_buf(), reason));
                }
                RestoreOutcome::Failed(reason) => {
                    tracing::warn!(path = %destination.display(), %reason, "restore failed");
                    report.failed_restores.push((destination.to_path_buf(), reason));
                }
            }
        }

        if !dry_run {
            for dir in vacated_dirs {
                prune_empty_ancestors(&dir, base_path);
            }
        }

        Ok(report)
    }

    /// The file is already back; a lost record only means a later undo will skip it.
    fn record(
        session: &Session<'_>,
        action: ActionKind,
        from: &Path,
        to: &Path,
        reverted: &SessionId,
    ) {
        if let Err(e) = session.record_revert(action, from, Some(to), reverted) {
            tracing::warn!(error = %e, "could not record undo action");
        }
    }

    /// Moves one file from `current` back to `original`.
    ///
    /// A dry run only records the move in `layout`, so later entries see the
    /// paths it would have freed and taken.
    fn restore_file(
        current: &Path,
        original: &Path,
        dry_run: bool,
        layout: &mut PlannedLayout,
    ) -> RestoreOutcome {
        if !layout.is_occupied(current) {
            return RestoreOutcome::Skipped("File not found at expected location".to_string());
        }

        if layout.is_occupied(original) {
            return RestoreOutcome::Failed(format!(
                "Original location {} is occupied by another file",
                original.display()
            ));
        }

        if dry_run {
            layout.plan_move(current, original);
            return RestoreOutcome::Restored;
        }

        if let Some(parent) = original.parent()
            && !parent.exists()
            && let Err(e) = fs::create_dir_all(parent)
        {
            return RestoreOutcome::Failed(format!("Could not recreate {}: {}", parent.display(), e));
        }

        match move_path(current, original) {
            Ok(()) => RestoreOutcome::Restored,
            Err(e) => RestoreOutcome::Failed(format!("Failed to restore file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn moved(session: &str, from: &Path, to: &Path) -> LogEntry {
        LogEntry::new(session.into(), ActionKind::Moved, from, Some(to))
    }

    #[test]
    fn test_plan_undo_empty_log() {
        assert!(plan_undo(&[]).is_none());
    }

    #[test]
    fn test_plan_undo_picks_latest_session_in_reverse() {
        let entries = vec![
            moved("s1", Path::new("a"), Path::new("D/a")),
            moved("s2", Path::new("b"), Path::new("D/b")),
            moved("s2", Path::new("c"), Path::new("D/c")),
        ];

        let (session, plan) = plan_undo(&entries).unwrap();
        assert_eq!(session.as_str(), "s2");
        let sources: Vec<_> = plan.iter().map(|e| e.source_path.clone()).collect();
        assert_eq!(sources, vec![PathBuf::from("c"), PathBuf::from("b")]);
    }

    #[test]
    fn test_plan_undo_ignores_non_reversible_sessions() {
        let entries = vec![
            moved("s1", Path::new("a"), Path::new("D/a")),
            LogEntry::new(
                "s2".into(),
                ActionKind::DuplicateSkipped,
                Path::new("b"),
                Some(Path::new("D/a")),
            ),
            LogEntry::new("s3".into(), ActionKind::Deleted, Path::new("D/old"), None),
        ];

        let (session, _) = plan_undo(&entries).unwrap();
        assert_eq!(session.as_str(), "s1");
    }

    #[test]
    fn test_reverted_session_is_not_planned_again() {
        let s1: SessionId = "s1".into();
        let entries = vec![
            moved("s1", Path::new("a"), Path::new("D/a")),
            moved("s2", Path::new("b"), Path::new("D/b")),
            LogEntry::new("u1".into(), ActionKind::Restored, Path::new("D/b"), Some(Path::new("b")))
                .reverting(&"s2".into()),
        ];

        let (session, plan) = plan_undo(&entries).unwrap();
        assert_eq!(session, s1);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_partially_reverted_session_keeps_remaining_entries() {
        let entries = vec![
            moved("s1", Path::new("a"), Path::new("D/a")),
            moved("s1", Path::new("b"), Path::new("D/b")),
            LogEntry::new("u1".into(), ActionKind::Restored, Path::new("D/b"), Some(Path::new("b")))
                .reverting(&"s1".into()),
        ];

        let (_, plan) = plan_undo(&entries).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].source_path, PathBuf::from("a"));
    }

    #[test]
    fn test_undo_no_history_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = LogStore::new(temp_dir.path().join("log.jsonl"));

        let report = UndoManager::undo(&store, temp_dir.path(), false).unwrap();
        assert!(report.nothing_to_undo());
        assert_eq!(report.total_processed(), 0);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_undo_restores_and_records() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let store = LogStore::new(base.join("log.jsonl"));

        let original = base.join("test.txt");
        let moved_to = base.join("Documents").join("test.txt");
        fs::create_dir_all(moved_to.parent().unwrap()).unwrap();
        fs::write(&moved_to, "test content").unwrap();
        Session::start(&store, false)
            .record(ActionKind::Moved, &original, Some(&moved_to))
            .unwrap();

        let report = UndoManager::undo(&store, base, false).unwrap();
        assert_eq!(report.restored_files, 1);
        assert!(report.is_complete_success());
        assert_eq!(fs::read_to_string(&original).unwrap(), "test content");
        assert!(!base.join("Documents").exists());

        // A second undo has nothing left to do.
        let again = UndoManager::undo(&store, base, false).unwrap();
        assert!(again.nothing_to_undo());
    }

    #[test]
    fn test_undo_missing_destination_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let store = LogStore::new(base.join("log.jsonl"));
        Session::start(&store, false)
            .record(
                ActionKind::Moved,
                &base.join("gone.txt"),
                Some(&base.join("Documents").join("gone.txt")),
            )
            .unwrap();

        let report = UndoManager::undo(&store, base, false).unwrap();
        assert_eq!(report.restored_files, 0);
        assert_eq!(report.skipped_files.len(), 1);
        assert!(report.is_complete_success());
        assert!(UndoManager::undo(&store, base, false).unwrap().nothing_to_undo());
    }

    #[test]
    fn test_undo_occupied_source_fails_and_stays_pending() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let store = LogStore::new(base.join("log.jsonl"));

        let original = base.join("test.txt");
        let moved_to = base.join("Documents").join("test.txt");
        fs::create_dir_all(moved_to.parent().unwrap()).unwrap();
        fs::write(&moved_to, "organized").unwrap();
        fs::write(&original, "newcomer").unwrap();
        Session::start(&store, false)
            .record(ActionKind::Moved, &original, Some(&moved_to))
            .unwrap();

        let report = UndoManager::undo(&store, base, false).unwrap();
        assert_eq!(report.failed_restores.len(), 1);
        assert_eq!(fs::read_to_string(&original).unwrap(), "newcomer");
        assert_eq!(fs::read_to_string(&moved_to).unwrap(), "organized");

        // Clearing the way lets a retry finish the job.
        fs::remove_file(&original).unwrap();
        let retry = UndoManager::undo(&store, base, false).unwrap();
        assert_eq!(retry.restored_files, 1);
        assert_eq!(fs::read_to_string(&original).unwrap(), "organized");
    }

    #[test]
    fn test_undo_reverse_order_unwinds_chained_moves() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let store = LogStore::new(base.join("log.jsonl"));

        // Forward pass: a.txt -> Documents/a.txt, then Documents/a.txt -> Trash/a.txt.
        let a = base.join("a.txt");
        let doc = base.join("Documents").join("a.txt");
        let trash = base.join("Trash").join("a.txt");
        fs::create_dir_all(trash.parent().unwrap()).unwrap();
        fs::write(&trash, "payload").unwrap();
        let session = Session::start(&store, false);
        session.record(ActionKind::Moved, &a, Some(&doc)).unwrap();
        session.record(ActionKind::Trashed, &doc, Some(&trash)).unwrap();

        let report = UndoManager::undo(&store, base, false).unwrap();
        assert_eq!(report.restored_files, 2);
        assert_eq!(fs::read_to_string(&a).unwrap(), "payload");
        assert!(!doc.exists());
        assert!(!trash.exists());
    }

    #[test]
    fn test_undo_dry_run_follows_chained_moves() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let store = LogStore::new(base.join("log.jsonl"));

        let a = base.join("a.txt");
        let doc = base.join("Documents").join("a.txt");
        let trash = base.join("Trash").join("a.txt");
        fs::create_dir_all(trash.parent().unwrap()).unwrap();
        fs::write(&trash, "payload").unwrap();
        let session = Session::start(&store, false);
        session.record(ActionKind::Moved, &a, Some(&doc)).unwrap();
        session.record(ActionKind::Trashed, &doc, Some(&trash)).unwrap();

        let report = UndoManager::undo(&store, base, true).unwrap();
        assert_eq!(report.restored_files, 2);
        assert!(report.skipped_files.is_empty());
        assert!(report.failed_restores.is_empty());
        assert!(trash.exists());
        assert!(!a.exists());
    }

    #[test]
    fn test_undo_dry_run_sees_its_own_restores() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let store = LogStore::new(base.join("log.jsonl"));

        // Two moves from the same source name: restoring the newer one
        // takes the spot the older one needs.
        let original = base.join("report.pdf");
        let first = base.join("Documents").join("report.pdf");
        let second = base.join("Documents").join("report (1).pdf");
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::write(&first, "one").unwrap();
        fs::write(&second, "two").unwrap();
        let session = Session::start(&store, false);
        session.record(ActionKind::Moved, &original, Some(&first)).unwrap();
        session.record(ActionKind::Moved, &original, Some(&second)).unwrap();

        let dry = UndoManager::undo(&store, base, true).unwrap();
        assert_eq!(dry.restored_files, 1);
        assert_eq!(dry.failed_restores.len(), 1);

        let real = UndoManager::undo(&store, base, false).unwrap();
        assert_eq!(real.restored_files, dry.restored_files);
        assert_eq!(real.failed_restores.len(), dry.failed_restores.len());
    }

    #[test]
    fn test_undo_dry_run_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let store = LogStore::new(base.join("log.jsonl"));

        let original = base.join("test.txt");
        let moved_to = base.join("Documents").join("test.txt");
        fs::create_dir_all(moved_to.parent().unwrap()).unwrap();
        fs::write(&moved_to, "content").unwrap();
        Session::start(&store, false)
            .record(ActionKind::Moved, &original, Some(&moved_to))
            .unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        let report = UndoManager::undo(&store, base, true).unwrap();
        assert_eq!(report.restored_files, 1);
        assert!(moved_to.exists());
        assert!(!original.exists());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }
}
