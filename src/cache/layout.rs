//! On-disk layout of the archive cache.
//!
//! ```text
//! <root>/
//! ├── <hash>/
//! │   ├── archive.<ext>        kept archive (optional)
//! │   ├── archive.<ext>.part   download in progress
//! │   ├── .staging-XXXXXX/     extraction in progress
//! │   └── pages/
//! │       ├── 00001.jpg
//! │       └── 00002.jpg
//! └── .trash-<hash>-<n>/       entry being deleted
//! ```

use std::path::{Path, PathBuf};

use crate::locator::ArchiveFormat;
use crate::transcode::PAGE_EXTENSION;

/// Digits in a page file name.
pub const PAGE_NAME_DIGITS: usize = 5;

/// Highest page index that fits in [`PAGE_NAME_DIGITS`] digits.
pub const MAX_PAGES: usize = 99_999;

pub const STAGING_PREFIX: &str = ".staging-";
pub const TRASH_PREFIX: &str = ".trash-";
pub const PARTIAL_SUFFIX: &str = ".part";

const ARCHIVE_STEM: &str = "archive";
const PAGES_DIR: &str = "pages";

/// Path builder for the cache tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything cached for one locator.
    pub fn entry_dir(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    pub fn archive_path(&self, hash: &str, format: ArchiveFormat) -> PathBuf {
        self.entry_dir(hash)
            .join(format!("{ARCHIVE_STEM}.{}", format.extension()))
    }

    /// Download target; renamed to [`archive_path`](Self::archive_path) once complete.
    pub fn partial_archive_path(&self, hash: &str, format: ArchiveFormat) -> PathBuf {
        self.entry_dir(hash).join(format!(
            "{ARCHIVE_STEM}.{}{PARTIAL_SUFFIX}",
            format.extension()
        ))
    }

    /// Published artifact directory.
    pub fn pages_dir(&self, hash: &str) -> PathBuf {
        self.entry_dir(hash).join(PAGES_DIR)
    }

    pub fn page_path(&self, hash: &str, index: usize) -> PathBuf {
        self.pages_dir(hash).join(page_file_name(index))
    }

    /// Unique sibling of the entry directory used for atomic removal.
    pub fn trash_dir(&self, hash: &str, nonce: u64) -> PathBuf {
        self.root.join(format!("{TRASH_PREFIX}{hash}-{nonce}"))
    }
}

/// Zero-padded artifact file name, e.g. `00042.jpg`.
pub fn page_file_name(index: usize) -> String {
    format!("{index:0width$}.{PAGE_EXTENSION}", width = PAGE_NAME_DIGITS)
}

/// Inverse of [`page_file_name`]. Returns `None` for anything else.
pub fn parse_page_file_name(name: &str) -> Option<usize> {
    let stem = name.strip_suffix(PAGE_EXTENSION)?.strip_suffix('.')?;
    if stem.len() != PAGE_NAME_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok().filter(|&index| index >= 1)
}

/// Whether a directory name is a locator hash (lowercase hex SHA-256).
pub fn is_entry_name(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Whether a file name inside an entry directory is a kept archive.
pub fn is_archive_name(name: &str) -> bool {
    name.strip_prefix(ARCHIVE_STEM)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(|ext| ArchiveFormat::from_extension(ext).is_some())
        .unwrap_or(false)
}
