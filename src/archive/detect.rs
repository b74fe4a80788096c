//! Container detection from magic bytes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::ArchiveError;
use crate::locator::ContainerKind;

/// Bytes needed to recognise every supported container (one tar header block).
pub const SNIFF_LEN: usize = 512;

/// Local file header, empty archive and spanned archive signatures.
const ZIP_MAGICS: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// Shared prefix of the RAR 1.5-4.x and RAR 5 signatures.
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";

/// POSIX and GNU tar both carry "ustar" at offset 257 of the first header.
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

/// Identify a container from its leading bytes.
///
/// Returns `None` when no signature matches; pre-POSIX tar files have no magic
/// and fall into this case.
pub fn sniff_container(header: &[u8]) -> Option<ContainerKind> {
    if ZIP_MAGICS.iter().any(|magic| header.starts_with(magic)) {
        return Some(ContainerKind::Zip);
    }
    if header.starts_with(RAR_MAGIC) {
        return Some(ContainerKind::Rar);
    }
    let tar_end = TAR_MAGIC_OFFSET + TAR_MAGIC.len();
    if header.len() >= tar_end && &header[TAR_MAGIC_OFFSET..tar_end] == TAR_MAGIC {
        return Some(ContainerKind::Tar);
    }
    None
}

/// Identify the container of a file on disk.
pub fn sniff_file(path: &Path) -> Result<Option<ContainerKind>, ArchiveError> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut header)?;
    Ok(sniff_container(&header))
}
