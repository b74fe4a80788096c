//! Extraction stage: archive entries → numbered page files.
//!
//! Runs on a blocking thread. Pages are written into a staging directory that
//! the caller publishes with a single rename.

use std::fs;
use std::ops::ControlFlow;
use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::archive::{open_reader, ImageFilter, RarBackend};
use crate::cache::{page_file_name, STAGING_PREFIX};
use crate::error::MaterializeError;
use crate::locator::ArchiveFormat;
use crate::transcode::PageEncoder;

/// Pages produced into a staging directory.
pub(crate) struct StagedPages {
    pub dir: TempDir,

    /// `(index, size)` in page order
    pub pages: Vec<(usize, u64)>,

    /// Entries that matched the filter but failed to transcode
    pub skipped: usize,
}

pub(crate) struct ExtractSettings<'a> {
    pub filter: &'a ImageFilter,
    pub encoder: &'a PageEncoder,
    pub rar_backend: &'a RarBackend,
    pub max_pages: usize,
}

/// Enumerate `archive`, transcode every image entry and write the survivors as
/// `00001.jpg`, `00002.jpg`, ... in encounter order.
///
/// Entries that fail to transcode are skipped without consuming a page number.
/// Container errors abort the whole extraction.
pub(crate) fn extract_pages(
    archive: &Path,
    format: ArchiveFormat,
    entry_dir: &Path,
    settings: &ExtractSettings<'_>,
) -> Result<StagedPages, MaterializeError> {
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(entry_dir)?;

    let mut reader = open_reader(archive, format, settings.rar_backend)?;
    debug!(backend = reader.name(), archive = %archive.display(), "Extracting archive");

    let mut pages = Vec::new();
    let mut skipped = 0;
    let mut write_error = None;

    let stats = reader.read_entries(settings.filter, &mut |entry| {
        let encoded = match settings.encoder.transcode(&entry.data) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(entry = %entry.name, error = %e, "Skipping undecodable entry");
                skipped += 1;
                return ControlFlow::Continue(());
            }
        };

        let index = pages.len() + 1;
        let path = staging.path().join(page_file_name(index));
        if let Err(e) = fs::write(&path, &encoded.data) {
            write_error = Some(e);
            return ControlFlow::Break(());
        }
        pages.push((index, encoded.data.len() as u64));

        if pages.len() >= settings.max_pages {
            warn!(
                max_pages = settings.max_pages,
                "Page limit reached, ignoring remaining entries"
            );
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    })?;

    if let Some(e) = write_error {
        return Err(e.into());
    }

    debug!(
        matched = stats.matched,
        unreadable = stats.skipped,
        undecodable = skipped,
        pages = pages.len(),
        "Extraction finished"
    );

    Ok(StagedPages {
        dir: staging,
        pages,
        skipped: skipped + stats.skipped,
    })
}
