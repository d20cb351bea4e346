//! Content-based duplicate detection against a category folder.
//!
//! Each category folder gets an index the first time a candidate is checked
//! against it. The index only records sizes up front; digests are computed
//! when a candidate of the same size shows up, and kept for the rest of the
//! run. Entries whose file is gone are dropped when next looked at.

use crate::digest::{ContentDigest, digest_file};
use crate::file_entry::FileEntry;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
struct KnownFile {
    /// Where the file is, or will be after a dry-run move.
    path: PathBuf,
    /// Where its bytes can be read right now.
    content_path: PathBuf,
    digest: Option<ContentDigest>,
}

impl KnownFile {
    fn digest(&mut self) -> io::Result<ContentDigest> {
        if let Some(digest) = self.digest {
            return Ok(digest);
        }
        let digest = digest_file(&self.content_path)?;
        self.digest = Some(digest);
        Ok(digest)
    }
}

#[derive(Debug, Default)]
struct CategoryIndex {
    by_size: HashMap<u64, Vec<KnownFile>>,
}

impl CategoryIndex {
    fn scan(root: &Path) -> Self {
        let mut index = Self::default();
        if !root.is_dir() {
            return index;
        }

        for entry in WalkDir::new(root).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(root = %root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let path = entry.into_path();
            index.insert(metadata.len(), path.clone(), path, None);
        }

        tracing::debug!(
            root = %root.display(),
            sizes = index.by_size.len(),
            "indexed category folder"
        );
        index
    }

    fn insert(
        &mut self,
        size: u64,
        path: PathBuf,
        content_path: PathBuf,
        digest: Option<ContentDigest>,
    ) {
        self.by_size.entry(size).or_default().push(KnownFile {
            path,
            content_path,
            digest,
        });
    }
}

/// Finds files whose content already exists in a category folder.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    indexes: HashMap<PathBuf, CategoryIndex>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the path of an existing file in `category_root` with the same
    /// bytes as `entry`, if any.
    ///
    /// Empty files never count as duplicates. Known files that have
    /// disappeared since they were indexed are dropped, and ones that cannot
    /// be read are ignored; failing to hash the candidate itself is an error.
    pub fn find_duplicate(
        &mut self,
        entry: &FileEntry,
        category_root: &Path,
    ) -> io::Result<Option<PathBuf>> {
        if entry.size == 0 {
            return Ok(None);
        }

        let index = self
            .indexes
            .entry(category_root.to_path_buf())
            .or_insert_with(|| CategoryIndex::scan(category_root));

        let Some(candidates) = index.by_size.get_mut(&entry.size) else {
            return Ok(None);
        };

        candidates.retain(|known| known.content_path.exists());
        if candidates.is_empty() {
            return Ok(None);
        }

        let digest = entry.content_hash()?;
        for known in candidates.iter_mut() {
            if known.content_path == entry.path {
                continue;
            }
            match known.digest() {
                Ok(known_digest) if known_digest == digest => {
                    return Ok(Some(known.path.clone()));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %known.content_path.display(), error = %e, "could not hash existing file");
                }
            }
        }
        Ok(None)
    }

    /// Registers a file placed into `category_root` during this run.
    ///
    /// `content_path` is where the bytes currently live: the destination for
    /// a real move, the untouched source for a dry run.
    pub fn record(
        &mut self,
        category_root: &Path,
        entry: &FileEntry,
        destination: &Path,
        content_path: &Path,
    ) {
        let digest = if entry.is_hashed() {
            entry.content_hash().ok()
        } else {
            None
        };

        if let Some(index) = self.indexes.get_mut(category_root) {
            index.insert(
                entry.size,
                destination.to_path_buf(),
                content_path.to_path_buf(),
                digest,
            );
        }
        // An index that was never built will pick the file up when it is scanned.
    }

    /// Drops `path` from the index of `category_root` after it was deleted or moved away.
    pub fn forget(&mut self, category_root: &Path, path: &Path) {
        let Some(index) = self.indexes.get_mut(category_root) else {
            return;
        };
        index.by_size.retain(|_, files| {
            files.retain(|known| known.path != path);
            !files.is_empty()
        });
    }
}
