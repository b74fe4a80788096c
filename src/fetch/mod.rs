//! Archive fetching.
//!
//! The materializer never talks to the network directly. It asks an
//! [`ArchiveSource`] to copy a locator's archive to a local path, which lets
//! tests substitute an in-memory source with a fetch counter.

mod http_source;

pub use http_source::{
    FetchConfig, HttpArchiveSource, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_REDIRECTS,
};

use std::path::Path;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::locator::Locator;

/// Source of remote archives.
#[async_trait]
pub trait ArchiveSource: Send + Sync + 'static {
    /// Download the archive behind `locator` into `dest`.
    ///
    /// Returns the number of bytes written. On error the caller removes
    /// whatever was written to `dest`.
    async fn fetch(&self, locator: &Locator, dest: &Path) -> Result<u64, FetchError>;
}
