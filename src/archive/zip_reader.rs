//! Flat, random-access container: zip / cbz.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::warn;
use zip::ZipArchive;

use super::{corrupt, ArchiveEntry, ArchiveReader, EntryVisitor, ImageFilter, ReadStats};
use crate::error::ArchiveError;

/// Upper bound on the buffer pre-allocated from an entry's declared size.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Reads zip entries by index.
///
/// A single unreadable entry (unsupported compression, bad checksum) is logged
/// and skipped; only a broken central directory fails the archive.
pub struct ZipReader {
    archive: ZipArchive<BufReader<File>>,
}

impl ZipReader {
    /// Open a zip archive and parse its central directory.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(corrupt)?;
        Ok(Self { archive })
    }

    /// Number of entries in the central directory, images or not.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }
}

impl ArchiveReader for ZipReader {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn read_entries(
        &mut self,
        filter: &ImageFilter,
        visit: &mut EntryVisitor<'_>,
    ) -> Result<ReadStats, ArchiveError> {
        let mut stats = ReadStats::default();

        for index in 0..self.archive.len() {
            let mut file = match self.archive.by_index(index) {
                Ok(file) => file,
                Err(e) => {
                    warn!(index, error = %e, "Skipping unreadable zip entry");
                    stats.skipped += 1;
                    continue;
                }
            };

            if file.is_dir() || !filter.accepts(file.name()) {
                continue;
            }

            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
            if let Err(e) = file.read_to_end(&mut data) {
                warn!(entry = %name, error = %e, "Skipping unreadable zip entry");
                stats.skipped += 1;
                continue;
            }
            drop(file);

            stats.matched += 1;
            if visit(ArchiveEntry { name, data }).is_break() {
                break;
            }
        }

        Ok(stats)
    }
}
