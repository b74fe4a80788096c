//! Stream container: tar / cbt.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::{corrupt, ArchiveEntry, ArchiveReader, EntryVisitor, ImageFilter, ReadStats};
use crate::error::ArchiveError;

/// Upper bound on the buffer pre-allocated from an entry's declared size.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Reads tar entries through the archive's header cursor.
///
/// Each matching entry is read to completion before the cursor moves on.
/// Non-matching entries are skipped by the cursor without being buffered. Any
/// header or stream error is fatal because the cursor cannot resynchronise.
pub struct TarReader {
    archive: tar::Archive<BufReader<File>>,
}

impl TarReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        Ok(Self {
            archive: tar::Archive::new(BufReader::new(file)),
        })
    }
}

impl ArchiveReader for TarReader {
    fn name(&self) -> &'static str {
        "tar"
    }

    fn read_entries(
        &mut self,
        filter: &ImageFilter,
        visit: &mut EntryVisitor<'_>,
    ) -> Result<ReadStats, ArchiveError> {
        let mut stats = ReadStats::default();

        for entry in self.archive.entries().map_err(corrupt)? {
            let mut entry = entry.map_err(corrupt)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let name = entry.path().map_err(corrupt)?.to_string_lossy().into_owned();
            if !filter.accepts(&name) {
                continue;
            }

            let mut data = Vec::with_capacity(entry.size().min(MAX_PREALLOC) as usize);
            entry.read_to_end(&mut data).map_err(corrupt)?;

            stats.matched += 1;
            if visit(ArchiveEntry { name, data }).is_break() {
                break;
            }
        }

        Ok(stats)
    }
}
