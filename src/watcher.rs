//! File-system subscription for watch mode.
//!
//! A debounced `notify` watcher on the downloads directory forwards batches
//! of candidate paths over a channel. The receiving side runs on the main
//! thread, so files are still processed one at a time.

use crate::cancel::CancellationToken;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to create watcher: {0}")]
    Create(#[source] notify::Error),
    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("Watcher stopped unexpectedly")]
    Disconnected,
}

/// Debounced watcher over one directory (non-recursive).
pub struct DownloadWatcher {
    // Dropping the debouncer stops the watch.
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    batches: Receiver<Vec<PathBuf>>,
}

impl DownloadWatcher {
    /// Starts watching `path`. Events are held back for `settle_delay` so a
    /// file that is still being written arrives as one batch after it goes quiet.
    pub fn start(path: &Path, settle_delay: Duration) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel();

        let mut debouncer = new_debouncer(
            settle_delay,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let paths = candidate_paths(events.iter().map(|e| &e.event));
                    if !paths.is_empty() {
                        let _ = tx.send(paths);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(%error, "watcher error");
                    }
                }
            },
        )
        .map_err(WatchError::Create)?;

        debouncer
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(path = %path.display(), "watching for new files");
        Ok(Self {
            _debouncer: debouncer,
            batches: rx,
        })
    }

    /// Waits up to `timeout` for the next batch. `Ok(None)` means nothing arrived.
    pub fn next_batch(&self, timeout: Duration) -> Result<Option<Vec<PathBuf>>, WatchError> {
        match self.batches.recv_timeout(timeout) {
            Ok(batch) => Ok(Some(batch)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WatchError::Disconnected),
        }
    }

    /// Feeds batches to `handle` until `token` is cancelled.
    ///
    /// The token is checked at least every `poll_interval`.
    pub fn run<F>(
        &self,
        token: &CancellationToken,
        poll_interval: Duration,
        mut handle: F,
    ) -> Result<(), WatchError>
    where
        F: FnMut(Vec<PathBuf>),
    {
        while !token.is_cancelled() {
            if let Some(batch) = self.next_batch(poll_interval)? {
                handle(batch);
            }
        }
        tracing::info!("watch stopped");
        Ok(())
    }
}

/// Paths from events that may mean a new or finished file, deduplicated in order.
///
/// Creations, data writes, close-after-write and rename targets count.
/// Removals, metadata changes and plain reads do not.
pub fn candidate_paths<'a>(events: impl IntoIterator<Item = &'a Event>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for event in events {
        let path = match event.kind {
            EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.first(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.last(),
            _ => None,
        };
        if let Some(path) = path
            && !paths.contains(path)
        {
            paths.push(path.clone());
        }
    }
    paths
}

/// Waits until the file size stops changing between two checks.
///
/// Returns false if the file disappears or is still growing after `attempts` checks.
pub fn wait_until_stable(path: &Path, interval: Duration, attempts: u32) -> bool {
    let Ok(mut last) = path.metadata().map(|m| m.len()) else {
        return false;
    };
    for _ in 0..attempts {
        thread::sleep(interval);
        let Ok(size) = path.metadata().map(|m| m.len()) else {
            return false;
        };
        if size == last {
            return true;
        }
        last = size;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn test_candidate_paths_filters_event_kinds() {
        let events = vec![
            event(EventKind::Create(CreateKind::File), &["/dl/a.pdf"]),
            event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &["/dl/a.pdf"]),
            event(EventKind::Remove(RemoveKind::File), &["/dl/gone.txt"]),
            event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), &["/dl/meta.txt"]),
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/dl/x.crdownload", "/dl/x.zip"],
            ),
            event(EventKind::Access(AccessKind::Close(AccessMode::Write)), &["/dl/b.jpg"]),
        ];

        assert_eq!(
            candidate_paths(&events),
            vec![
                PathBuf::from("/dl/a.pdf"),
                PathBuf::from("/dl/x.zip"),
                PathBuf::from("/dl/b.jpg"),
            ]
        );
    }

    #[test]
    fn test_wait_until_stable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("done.bin");
        fs::write(&path, "complete").unwrap();

        assert!(wait_until_stable(&path, Duration::from_millis(10), 3));
        assert!(!wait_until_stable(
            &temp_dir.path().join("missing"),
            Duration::from_millis(10),
            3
        ));
    }

    #[test]
    fn test_run_returns_when_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let watcher = DownloadWatcher::start(temp_dir.path(), Duration::from_millis(50)).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let started = Instant::now();
        watcher
            .run(&token, Duration::from_millis(20), |_| panic!("no batch expected"))
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_reports_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let watcher = DownloadWatcher::start(temp_dir.path(), Duration::from_millis(100)).unwrap();
        let path = temp_dir.path().join("fresh.txt");
        fs::write(&path, "hello").unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = false;
        while Instant::now() < deadline && !seen {
            if let Some(batch) = watcher.next_batch(Duration::from_millis(200)).unwrap() {
                seen = batch.iter().any(|p| p.file_name() == path.file_name());
            }
        }
        assert!(seen, "watcher should report the created file");
    }
}
