//! Materializer: turns a locator into a Ready cache entry.
//!
//! The materializer provides:
//! - Single-flight per locator hash: concurrent callers share one run and
//!   receive the identical result
//! - The fetch → extract → transcode → publish pipeline
//! - Eviction sweeps before the fetch and after registration, never touching
//!   the locator being materialized
//!
//! # Pipeline
//!
//! ```text
//! Empty ──► Materializing ──┬──► Ready   (pages/ published, entry indexed)
//!                           └──► Failed  (broadcast to waiters, nothing kept)
//! ```
//!
//! Each run executes in its own spawned task, so a caller that stops waiting
//! never strands the other waiters.

mod pipeline;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::archive::{ImageFilter, RarBackend};
use crate::cache::{CacheEntry, CacheStore, EvictionReport, PageArtifact, MAX_PAGES};
use crate::error::MaterializeError;
use crate::fetch::ArchiveSource;
use crate::locator::Locator;
use crate::transcode::PageEncoder;

use pipeline::{extract_pages, ExtractSettings};

/// Result shared by every waiter of one run.
pub type MaterializeResult = Result<Arc<CacheEntry>, MaterializeError>;

type Slot = watch::Receiver<Option<MaterializeResult>>;

// =============================================================================
// Options
// =============================================================================

/// Tunables for the materialization pipeline.
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    /// How RAR containers are read
    pub rar_backend: RarBackend,

    /// Keep the downloaded archive next to its pages (counts toward the budget)
    pub keep_archives: bool,

    /// Page cap per archive
    pub max_pages: usize,

    /// Which entries count as images
    pub filter: ImageFilter,

    /// Page transcoder
    pub encoder: PageEncoder,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            rar_backend: RarBackend::default(),
            keep_archives: false,
            max_pages: MAX_PAGES,
            filter: ImageFilter::default(),
            encoder: PageEncoder::default(),
        }
    }
}

// =============================================================================
// Materializer
// =============================================================================

struct Inner<S> {
    source: S,
    store: Arc<CacheStore>,
    options: Arc<MaterializeOptions>,
    in_flight: Mutex<HashMap<String, Slot>>,
}

/// Single-flight materializer over an [`ArchiveSource`].
///
/// Cloning is cheap; clones share the in-flight table.
pub struct Materializer<S: ArchiveSource> {
    inner: Arc<Inner<S>>,
}

impl<S: ArchiveSource> Clone for Materializer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ArchiveSource> Materializer<S> {
    pub fn new(source: S, store: Arc<CacheStore>, options: MaterializeOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                options: Arc::new(options),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    pub fn options(&self) -> &MaterializeOptions {
        &self.inner.options
    }

    /// Materialize `locator` and wait for the outcome.
    pub async fn materialize(&self, locator: &Locator) -> MaterializeResult {
        self.begin(locator).await.wait().await
    }

    /// Start (or join) the materialization of `locator` without waiting.
    ///
    /// A Ready entry is returned immediately and touched. Otherwise the caller
    /// either joins the run already in flight for the hash or starts one.
    pub async fn begin(&self, locator: &Locator) -> PendingMaterialization {
        let hash = locator.hash().to_string();
        let mut in_flight = self.inner.in_flight.lock().await;

        if let Some(slot) = in_flight.get(&hash) {
            debug!(hash = %hash, "Joining in-flight materialization");
            return PendingMaterialization::joined(hash, slot.clone());
        }

        if let Some(entry) = self.inner.store.access(&hash) {
            return PendingMaterialization::ready(hash, entry);
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(hash.clone(), rx.clone());
        drop(in_flight);

        let inner = Arc::clone(&self.inner);
        let locator = locator.clone();
        let slot_hash = hash.clone();
        tokio::spawn(async move {
            let worker = tokio::spawn({
                let inner = Arc::clone(&inner);
                async move { inner.run(&locator).await }
            });
            let result = match worker.await {
                Ok(result) => result,
                Err(e) => Err(MaterializeError::Aborted(e.to_string())),
            };

            // Release the slot and publish under the same lock so a newcomer
            // sees either the slot or the registered entry.
            let mut in_flight = inner.in_flight.lock().await;
            in_flight.remove(&slot_hash);
            tx.send_replace(Some(result));
        });

        PendingMaterialization::leader(hash, rx)
    }

    /// Whether a run for `hash` is currently in flight.
    pub async fn is_in_flight(&self, hash: &str) -> bool {
        self.inner.in_flight.lock().await.contains_key(hash)
    }

    /// Number of runs currently in flight.
    pub async fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }

    /// Run an eviction sweep on a blocking thread.
    pub async fn evict(&self, exclude: Option<&str>) -> EvictionReport {
        self.inner.evict(exclude).await
    }
}

impl<S: ArchiveSource> Inner<S> {
    async fn run(&self, locator: &Locator) -> MaterializeResult {
        let hash = locator.hash();
        let started = Instant::now();
        info!(hash, url = %locator.source_url(), "Materializing archive");

        let entry_dir = self.store.layout().entry_dir(hash);
        match self.run_pipeline(locator, &entry_dir).await {
            Ok(entry) => {
                info!(
                    hash,
                    pages = entry.page_count(),
                    bytes = entry.total_bytes(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Archive materialized"
                );
                Ok(entry)
            }
            Err(e) => {
                warn!(hash, error = %e, "Materialization failed");
                if let Err(cleanup) = fs::remove_dir_all(&entry_dir).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(hash, error = %cleanup, "Failed to clean up entry directory");
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, locator: &Locator, entry_dir: &Path) -> MaterializeResult {
        let hash = locator.hash();
        self.evict(Some(hash)).await;

        fs::create_dir_all(entry_dir).await?;

        let archive_path = self.store.layout().archive_path(hash, locator.format());
        if fs::try_exists(&archive_path).await.unwrap_or(false) {
            debug!(hash, "Reusing archive already on disk");
        } else {
            self.fetch_archive(locator, &archive_path).await?;
        }

        let entry = self.publish(locator, entry_dir, &archive_path).await?;
        self.evict(Some(hash)).await;
        Ok(entry)
    }

    /// Download into the partial path, then rename into place.
    async fn fetch_archive(
        &self,
        locator: &Locator,
        archive_path: &Path,
    ) -> Result<(), MaterializeError> {
        let partial = self
            .store
            .layout()
            .partial_archive_path(locator.hash(), locator.format());

        match self.source.fetch(locator, &partial).await {
            Ok(bytes) => {
                debug!(hash = locator.hash(), bytes, "Archive downloaded");
                fs::rename(&partial, archive_path).await?;
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            path = %partial.display(),
                            error = %cleanup,
                            "Failed to remove partial download"
                        );
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Extract on a blocking thread, publish `pages/` and register the entry.
    async fn publish(
        &self,
        locator: &Locator,
        entry_dir: &Path,
        archive_path: &Path,
    ) -> MaterializeResult {
        let hash = locator.hash();
        let layout = self.store.layout();

        let options = Arc::clone(&self.options);
        let archive = archive_path.to_path_buf();
        let dir = entry_dir.to_path_buf();
        let format = locator.format();
        let staged = tokio::task::spawn_blocking(move || {
            let settings = ExtractSettings {
                filter: &options.filter,
                encoder: &options.encoder,
                rar_backend: &options.rar_backend,
                max_pages: options.max_pages,
            };
            extract_pages(&archive, format, &dir, &settings)
        })
        .await
        .map_err(|e| MaterializeError::Aborted(e.to_string()))??;

        if staged.pages.is_empty() {
            return Err(MaterializeError::EmptyArchive);
        }
        if staged.skipped > 0 {
            warn!(hash, skipped = staged.skipped, "Some entries were skipped");
        }

        let pages_dir = layout.pages_dir(hash);
        if fs::try_exists(&pages_dir).await.unwrap_or(false) {
            fs::remove_dir_all(&pages_dir).await?;
        }
        fs::rename(staged.dir.path(), &pages_dir).await?;

        let pages = staged
            .pages
            .iter()
            .map(|&(index, size)| PageArtifact {
                index,
                path: layout.page_path(hash, index),
                size,
            })
            .collect();

        let archive = if self.options.keep_archives {
            let size = fs::metadata(archive_path).await?.len();
            Some((archive_path.to_path_buf(), size))
        } else {
            if let Err(e) = fs::remove_file(archive_path).await {
                warn!(path = %archive_path.display(), error = %e, "Failed to delete archive");
            }
            None
        };

        Ok(self.store.put(CacheEntry::new(hash, entry_dir, pages, archive)))
    }

    async fn evict(&self, exclude: Option<&str>) -> EvictionReport {
        let store = Arc::clone(&self.store);
        let exclude = exclude.map(str::to_string);
        let sweep = tokio::task::spawn_blocking(move || store.evict_to_budget(exclude.as_deref()));
        match sweep.await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Eviction task failed");
                EvictionReport {
                    total_bytes: self.store.total_bytes(),
                    ..Default::default()
                }
            }
        }
    }
}

// =============================================================================
// Pending Materialization
// =============================================================================

/// How a caller got hold of a [`PendingMaterialization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRole {
    /// The entry was already Ready
    Ready,
    /// This caller started the run
    Leader,
    /// This caller joined a run already in flight
    Joined,
}

/// Handle on a run that may still be in progress.
#[derive(Debug)]
pub struct PendingMaterialization {
    hash: String,
    slot: Slot,
    role: JoinRole,
}

impl PendingMaterialization {
    fn ready(hash: String, entry: Arc<CacheEntry>) -> Self {
        let (_, slot) = watch::channel(Some(Ok(entry)));
        Self {
            hash,
            slot,
            role: JoinRole::Ready,
        }
    }

    fn leader(hash: String, slot: Slot) -> Self {
        Self {
            hash,
            slot,
            role: JoinRole::Leader,
        }
    }

    fn joined(hash: String, slot: Slot) -> Self {
        Self {
            hash,
            slot,
            role: JoinRole::Joined,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn role(&self) -> JoinRole {
        self.role
    }

    /// The outcome, if the run has finished.
    pub fn try_result(&self) -> Option<MaterializeResult> {
        self.slot.borrow().clone()
    }

    /// Wait for the run to finish.
    pub async fn wait(mut self) -> MaterializeResult {
        let result = match self.slot.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        result.unwrap_or_else(|| {
            Err(MaterializeError::Aborted(
                "materialization worker went away".to_string(),
            ))
        })
    }
}
