//! Archive readers.
//!
//! Every container variant implements [`ArchiveReader`]: it walks the container
//! in its native order and hands each image entry to a visitor, one entry at a
//! time. Walking is lazy and non-restartable; the visitor can stop early by
//! returning [`ControlFlow::Break`].
//!
//! # Variants
//!
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────────────────────┐
//! │ Reader       │ Container            │ Enumeration                  │
//! ├──────────────┼──────────────────────┼──────────────────────────────┤
//! │ ZipReader    │ zip / cbz            │ by index, random access      │
//! │ TarReader    │ tar / cbt            │ header cursor, streamed      │
//! │ RarReader    │ rar / cbr (unrar)    │ header cursor, streamed      │
//! │ CommandReader│ rar / cbr (external) │ unpack, then sorted by path  │
//! └──────────────┴──────────────────────┴──────────────────────────────┘
//! ```
//!
//! [`open_reader`] picks the variant from the container's magic bytes, falling
//! back to the declared format when the bytes are not recognised.

mod command_reader;
mod detect;
mod rar_reader;
mod tar_reader;
mod zip_reader;

pub use command_reader::{default_unpack_commands, CommandReader, UnpackCommand};
pub use detect::{sniff_container, sniff_file, SNIFF_LEN};
pub use rar_reader::RarReader;
pub use tar_reader::TarReader;
pub use zip_reader::ZipReader;

use std::ops::ControlFlow;
use std::path::Path;

use tracing::warn;

use crate::error::ArchiveError;
use crate::locator::{ArchiveFormat, ContainerKind};

/// Raster extensions accepted by default.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// One image entry read out of a container.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry path inside the container
    pub name: String,

    /// Raw entry bytes
    pub data: Vec<u8>,
}

/// Counters returned by [`ArchiveReader::read_entries`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Entries that matched the filter and were handed to the visitor
    pub matched: usize,

    /// Matching entries that could not be read and were skipped
    pub skipped: usize,
}

/// Visitor invoked for each matching entry.
pub type EntryVisitor<'a> = dyn FnMut(ArchiveEntry) -> ControlFlow<()> + 'a;

/// Format-specific entry enumeration.
pub trait ArchiveReader {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Walk the container, handing every entry accepted by `filter` to `visit`
    /// in container order.
    ///
    /// Entries are produced one at a time and each entry's bytes are fully
    /// read before the cursor advances. A reader can be walked once.
    fn read_entries(
        &mut self,
        filter: &ImageFilter,
        visit: &mut EntryVisitor<'_>,
    ) -> Result<ReadStats, ArchiveError>;
}

// =============================================================================
// Image Filter
// =============================================================================

/// Case-insensitive extension filter for image entries.
#[derive(Debug, Clone)]
pub struct ImageFilter {
    extensions: Vec<String>,
}

impl ImageFilter {
    /// Create a filter from a list of extensions (with or without leading dot).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Whether an entry with this name should be treated as a page image.
    ///
    /// Directories, hidden AppleDouble files and anything under `__MACOSX/`
    /// are rejected.
    pub fn accepts(&self, name: &str) -> bool {
        let name = name.replace('\\', "/");
        if name.ends_with('/') || name.split('/').any(|part| part == "__MACOSX") {
            return false;
        }

        let file = name.rsplit('/').next().unwrap_or(&name);
        if file.starts_with("._") {
            return false;
        }

        match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
            }
            _ => false,
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_EXTENSIONS)
    }
}

// =============================================================================
// Reader Selection
// =============================================================================

/// How RAR containers are read.
#[derive(Debug, Clone, Default)]
pub enum RarBackend {
    /// In-process decoding with the unrar library
    #[default]
    Native,

    /// External unpack commands, tried in order
    Command(Vec<UnpackCommand>),
}

/// Open the reader for an archive on disk.
///
/// The container is sniffed from its magic bytes. When the bytes disagree with
/// the declared format the sniffed container wins, since archive sites often
/// mislabel `.cbz`/`.cbr` files.
pub fn open_reader(
    path: &Path,
    declared: ArchiveFormat,
    rar_backend: &RarBackend,
) -> Result<Box<dyn ArchiveReader>, ArchiveError> {
    let container = match sniff_file(path)? {
        Some(sniffed) if sniffed != declared.container() => {
            warn!(
                declared = declared.extension(),
                detected = sniffed.name(),
                "Archive content does not match its extension"
            );
            sniffed
        }
        Some(sniffed) => sniffed,
        None => declared.container(),
    };

    let reader: Box<dyn ArchiveReader> = match container {
        ContainerKind::Zip => Box::new(ZipReader::open(path)?),
        ContainerKind::Tar => Box::new(TarReader::open(path)?),
        ContainerKind::Rar => match rar_backend {
            RarBackend::Native => Box::new(RarReader::open(path)?),
            RarBackend::Command(commands) => Box::new(CommandReader::new(path, commands.clone())),
        },
    };
    Ok(reader)
}

pub(crate) fn corrupt(err: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Corrupt {
        reason: err.to_string(),
    }
}
