//! Stream container: rar / cbr, decoded in-process by unrar.

use std::path::{Path, PathBuf};

use super::{corrupt, ArchiveEntry, ArchiveReader, EntryVisitor, ImageFilter, ReadStats};
use crate::error::ArchiveError;

/// Reads RAR entries through unrar's header cursor.
///
/// The cursor is consumed by each step: `read` or `skip` hands back the cursor
/// positioned before the next header.
pub struct RarReader {
    path: PathBuf,
}

impl RarReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        if !path.is_file() {
            return Err(ArchiveError::Io(format!(
                "archive not found: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl ArchiveReader for RarReader {
    fn name(&self) -> &'static str {
        "unrar"
    }

    fn read_entries(
        &mut self,
        filter: &ImageFilter,
        visit: &mut EntryVisitor<'_>,
    ) -> Result<ReadStats, ArchiveError> {
        let mut stats = ReadStats::default();
        let mut cursor = unrar::Archive::new(&self.path)
            .open_for_processing()
            .map_err(corrupt)?;

        while let Some(header) = cursor.read_header().map_err(corrupt)? {
            let entry = header.entry();
            let name = entry.filename.to_string_lossy().into_owned();

            if !entry.is_file() || !filter.accepts(&name) {
                cursor = header.skip().map_err(corrupt)?;
                continue;
            }

            let (data, next) = header.read().map_err(corrupt)?;
            cursor = next;

            stats.matched += 1;
            if visit(ArchiveEntry { name, data }).is_break() {
                break;
            }
        }

        Ok(stats)
    }
}
