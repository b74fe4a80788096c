//! # Folio Streamer
//!
//! An on-demand page server for remote image archives.
//!
//! Archives (CBZ/ZIP, CBR/RAR, CBT/TAR) are identified by a locator hash
//! derived from their source URL. The first request for a locator downloads
//! the archive, extracts its image entries in container order, transcodes
//! each one into a bounded JPEG page and publishes the pages into a disk
//! cache. Later requests are served straight from the cache.
//!
//! ## Features
//!
//! - **Single-flight materialization**: concurrent requests for the same
//!   archive share one download and one extraction
//! - **Byte-budgeted disk cache**: least-recently-accessed archives are
//!   evicted first; an archive that is being read is never evicted
//! - **Crash recovery**: the cache index is rebuilt from disk at start-up
//! - **Hot page cache**: recently served pages stay in memory
//!
//! ## Architecture
//!
//! - [`locator`] - Locator hashing and the archive catalog
//! - [`fetch`] - Archive download over HTTP(S)
//! - [`archive`] - Container sniffing and entry readers
//! - [`transcode`] - Image decode, downscale and JPEG encode
//! - [`materialize`] - Single-flight fetch/extract/publish pipeline
//! - [`cache`] - On-disk layout, entry index, eviction and recovery
//! - [`pages`] - Pagination and page reads
//! - [`engine`] - Facade tying the pieces together
//! - [`server`] - Axum-based HTTP API
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use folio_streamer::{
//!     create_router, AppState, CacheLayout, CacheStore, Catalog, Engine, EngineConfig,
//!     FetchConfig, HttpArchiveSource, RouterConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(Catalog::new());
//!     catalog.add("https://example.com/comics/issue-01.cbz").await?;
//!
//!     let source = HttpArchiveSource::new(FetchConfig::default())?;
//!     let store = Arc::new(CacheStore::new(
//!         CacheLayout::new("./folio-cache"),
//!         1024 * 1024 * 1024,
//!     ));
//!     let engine = Arc::new(Engine::new(source, catalog, store, EngineConfig::default()));
//!     engine.recover().await?;
//!
//!     let router = create_router(AppState::new(engine), RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod materialize;
pub mod pages;
pub mod server;
pub mod transcode;

// Re-export commonly used types
pub use archive::{open_reader, ArchiveReader, EntryVisitor, ImageFilter, RarBackend};
pub use cache::{ActiveGuard, CacheEntry, CacheLayout, CacheStore, EvictionReport};
pub use config::Config;
pub use engine::{CacheStats, Engine, EngineConfig, Readiness};
pub use error::{
    ArchiveError, EngineError, FetchError, LocatorError, MaterializeError, PageError,
    TranscodeError,
};
pub use fetch::{ArchiveSource, FetchConfig, HttpArchiveSource};
pub use locator::{ArchiveFormat, Catalog, Locator, LocatorStore};
pub use materialize::{MaterializeOptions, Materializer};
pub use pages::{PageCache, PageData, PageServer, PageSlice};
pub use server::{create_router, AppState, RouterConfig};
pub use transcode::{EncodedPage, PageEncoder};
