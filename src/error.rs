use thiserror::Error;

/// Errors raised while downloading an archive from its source address.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection, TLS or redirect failure
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    /// The transfer did not complete within the configured timeout
    #[error("Download timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The archive is larger than the configured limit
    #[error("Archive too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// Writing the downloaded bytes to disk failed
    #[error("I/O error while saving archive: {0}")]
    Io(String),
}

/// Errors raised while opening or walking an archive container.
///
/// Any of these aborts the whole materialization.
#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    /// The container could not be parsed
    #[error("Corrupt archive: {reason}")]
    Corrupt { reason: String },

    /// No extraction backend could handle the container
    #[error("No extractor available: {reason}")]
    Unavailable { reason: String },

    /// Reading the archive file failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Io(err.to_string())
    }
}

/// Errors raised while transcoding a single image entry.
///
/// These never abort a batch; the entry is skipped and logged.
#[derive(Debug, Clone, Error)]
pub enum TranscodeError {
    /// The entry bytes are not a decodable raster image
    #[error("Bad image: {message}")]
    BadImage { message: String },

    /// The decoded image could not be re-encoded
    #[error("Failed to encode page: {message}")]
    EncodeFailed { message: String },
}

/// Errors that abort a materialization.
///
/// The same value is delivered to every caller waiting on the locator, so the
/// type is `Clone`.
#[derive(Debug, Clone, Error)]
pub enum MaterializeError {
    /// The locator hash is not known to the metadata store
    #[error("Unknown locator: {hash}")]
    NotFound { hash: String },

    /// The archive could not be downloaded
    #[error("Fetch failed: {0}")]
    FetchFailed(#[from] FetchError),

    /// The archive container is unreadable
    #[error("Corrupt archive: {0}")]
    CorruptArchive(#[from] ArchiveError),

    /// The archive holds no decodable image entries
    #[error("Archive contains no decodable images")]
    EmptyArchive,

    /// The cache directory could not be written
    #[error("Cache storage error: {0}")]
    Storage(String),

    /// The worker task ended without reporting a result
    #[error("Materialization aborted: {0}")]
    Aborted(String),
}

impl From<std::io::Error> for MaterializeError {
    fn from(err: std::io::Error) -> Self {
        MaterializeError::Storage(err.to_string())
    }
}

/// Errors raised by the page server.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    /// No ready artifact set exists for this hash
    #[error("No pages available for {hash}")]
    NotFound { hash: String },

    /// The page index is outside `1..=total`
    #[error("Page {page} not found (archive has {total} pages)")]
    PageNotFound { page: i64, total: usize },

    /// Negative pagination offset
    #[error("Invalid offset: {offset} (must be >= 0)")]
    InvalidOffset { offset: i64 },

    /// Reading a page file failed
    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors raised when building locators or editing the catalog.
#[derive(Debug, Clone, Error)]
pub enum LocatorError {
    /// The address does not parse as a URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Only http and https sources can be fetched
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// The address does not end in a supported archive extension
    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// The locator is already in the catalog
    #[error("Archive already added: {hash}")]
    Duplicate { hash: String },

    /// The catalog file could not be loaded
    #[error("Catalog error: {0}")]
    Catalog(String),
}

/// Errors surfaced by the engine facade.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// Cache maintenance (clear, purge) failed
    #[error("Cache maintenance failed: {0}")]
    Maintenance(String),
}
