//! A candidate file picked up by a scan or a watch event.

use crate::classifier::sniff_extension;
use crate::digest::{ContentDigest, digest_file};
use chrono::{DateTime, Local};
use std::cell::OnceCell;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// A file considered for organization.
///
/// The content hash is computed on first request and then cached; most
/// files never need one.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Lowercase extension from the name, or sniffed from content when the name has none.
    pub extension: Option<String>,
    pub size: u64,
    pub mtime: SystemTime,
    content_hash: OnceCell<ContentDigest>,
}

impl FileEntry {
    /// Reads metadata for a regular file.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = path.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .or_else(|| sniff_extension(path));

        Ok(Self {
            path: path.to_path_buf(),
            extension,
            size: metadata.len(),
            mtime: metadata.modified()?,
            content_hash: OnceCell::new(),
        })
    }

    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// Returns the content digest, hashing the file on first use.
    pub fn content_hash(&self) -> io::Result<ContentDigest> {
        if let Some(digest) = self.content_hash.get() {
            return Ok(*digest);
        }
        let digest = digest_file(&self.path)?;
        Ok(*self.content_hash.get_or_init(|| digest))
    }

    /// True once the content hash has been computed.
    pub fn is_hashed(&self) -> bool {
        self.content_hash.get().is_some()
    }

    /// Modification time in local time, used for date subfolders.
    pub fn modified_local(&self) -> DateTime<Local> {
        DateTime::<Local>::from(self.mtime)
    }

    /// How long ago the file was last modified. Future mtimes count as zero.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.mtime).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_path_reads_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Report.PDF");
        std::fs::write(&path, "twelve bytes").unwrap();

        let entry = FileEntry::from_path(&path).unwrap();
        assert_eq!(entry.extension.as_deref(), Some("pdf"));
        assert_eq!(entry.size, 12);
        assert_eq!(entry.file_name().unwrap(), "Report.PDF");
        assert!(!entry.is_hashed());
    }

    #[test]
    fn test_extensionless_file_is_sniffed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("invoice");
        std::fs::write(&path, b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n").unwrap();

        let entry = FileEntry::from_path(&path).unwrap();
        assert_eq!(entry.extension.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_directory_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        assert!(FileEntry::from_path(temp_dir.path()).is_err());
    }

    #[test]
    fn test_content_hash_is_cached() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        std::fs::write(&path, "content").unwrap();

        let entry = FileEntry::from_path(&path).unwrap();
        let first = entry.content_hash().unwrap();
        assert!(entry.is_hashed());

        // The cached value survives the file changing underneath.
        std::fs::write(&path, "changed").unwrap();
        assert_eq!(entry.content_hash().unwrap(), first);
    }

    #[test]
    fn test_age_of_future_mtime_is_zero() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        std::fs::write(&path, "content").unwrap();

        let entry = FileEntry::from_path(&path).unwrap();
        let earlier = entry.mtime - Duration::from_secs(60);
        assert_eq!(entry.age(earlier), Duration::ZERO);
        assert!(entry.age(entry.mtime + Duration::from_secs(5)) >= Duration::from_secs(5));
    }
}
