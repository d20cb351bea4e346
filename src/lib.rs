//! dlsort - keeps a downloads folder organized
//!
//! Files at the top level of the downloads directory are sorted into category
//! folders by extension, with content-hash duplicate detection, optional
//! `YYYY/MM` subfolders and retention cleanup. Every action is appended to a
//! JSON-lines log so the most recent run can be undone. A watch mode keeps
//! organizing new downloads as they arrive.

pub mod cancel;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod digest;
pub mod duplicates;
pub mod file_entry;
pub mod history;
pub mod logging;
pub mod maintenance;
pub mod mover;
pub mod notifier;
pub mod organizer;
pub mod output;
pub mod summary;
pub mod undo;
pub mod watcher;

pub use classifier::Classifier;
pub use config::{CompiledFilters, Config, ConfigError, DuplicatePolicy};
pub use history::{ActionKind, LogEntry, LogStore, SessionId};
pub use organizer::{FileOutcome, Organizer};
pub use summary::RunSummary;
pub use undo::{UndoManager, UndoReport};

pub use cli::{OrganizeCommand, RunError, RunStatus, resolve_base_path, run_cli};
