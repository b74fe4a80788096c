//! Locators: stable identities for remote archives.
//!
//! A [`Locator`] is derived from an archive's source URL. Its hash is the
//! lowercase hex SHA-256 of the normalized URL and is the only thing the rest of
//! the engine uses to refer to it. The metadata behind a hash is resolved
//! through a [`LocatorStore`]; [`Catalog`] is the in-memory implementation.

mod catalog;

pub use catalog::{Catalog, CatalogEntry, CatalogFile, LocatorStore};

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::LocatorError;

// =============================================================================
// Archive Format
// =============================================================================

/// Container format declared by a locator's file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Cbz,
    Rar,
    Cbr,
    Tar,
    Cbt,
}

/// The physical container behind an [`ArchiveFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Random-access container enumerated by index
    Zip,
    /// Stream container enumerated by header cursor
    Tar,
    /// Stream container enumerated by header cursor
    Rar,
}

impl ArchiveFormat {
    /// Parse a file extension (without the dot), ignoring case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "zip" => Some(ArchiveFormat::Zip),
            "cbz" => Some(ArchiveFormat::Cbz),
            "rar" => Some(ArchiveFormat::Rar),
            "cbr" => Some(ArchiveFormat::Cbr),
            "tar" => Some(ArchiveFormat::Tar),
            "cbt" => Some(ArchiveFormat::Cbt),
            _ => None,
        }
    }

    /// Canonical file extension for this format.
    pub const fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Cbz => "cbz",
            ArchiveFormat::Rar => "rar",
            ArchiveFormat::Cbr => "cbr",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Cbt => "cbt",
        }
    }

    /// Container that holds archives of this format.
    pub const fn container(&self) -> ContainerKind {
        match self {
            ArchiveFormat::Zip | ArchiveFormat::Cbz => ContainerKind::Zip,
            ArchiveFormat::Rar | ArchiveFormat::Cbr => ContainerKind::Rar,
            ArchiveFormat::Tar | ArchiveFormat::Cbt => ContainerKind::Tar,
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl ContainerKind {
    pub const fn name(&self) -> &'static str {
        match self {
            ContainerKind::Zip => "zip",
            ContainerKind::Tar => "tar",
            ContainerKind::Rar => "rar",
        }
    }
}

// =============================================================================
// Locator
// =============================================================================

/// Identity and source metadata for one remote archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    hash: String,
    source_url: Url,
    format: ArchiveFormat,
    title: String,
}

impl Locator {
    /// Build a locator from a raw source address.
    ///
    /// The address is parsed and normalized (scheme and host lowercased,
    /// fragment removed), the format is taken from the extension of the last
    /// path segment and the title from its percent-decoded file stem.
    pub fn from_url(raw: &str) -> Result<Self, LocatorError> {
        let url = normalize_url(raw)?;
        let file_name = last_segment(&url)
            .ok_or_else(|| LocatorError::UnsupportedFormat(url.to_string()))?;

        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), ext.to_string()),
            _ => return Err(LocatorError::UnsupportedFormat(file_name)),
        };
        let format = ArchiveFormat::from_extension(&ext)
            .ok_or_else(|| LocatorError::UnsupportedFormat(file_name.clone()))?;

        Ok(Self::with_parts(url, format, stem))
    }

    /// Build a locator from a raw address with an explicit display title.
    pub fn with_title(raw: &str, title: impl Into<String>) -> Result<Self, LocatorError> {
        let mut locator = Self::from_url(raw)?;
        locator.title = title.into();
        Ok(locator)
    }

    fn with_parts(source_url: Url, format: ArchiveFormat, title: String) -> Self {
        Self {
            hash: locator_hash(&source_url),
            source_url,
            format,
            title,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Stable hash of a normalized source URL.
pub fn locator_hash(url: &Url) -> String {
    hex::encode(Sha256::digest(url.as_str().as_bytes()))
}

fn normalize_url(raw: &str) -> Result<Url, LocatorError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| LocatorError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(LocatorError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(LocatorError::InvalidUrl(format!("{raw}: missing host")));
    }
    url.set_fragment(None);
    Ok(url)
}

fn last_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded)
}

// =============================================================================
// Tests
// =============================================================================
