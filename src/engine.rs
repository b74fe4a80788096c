//! Engine facade.
//!
//! The single entry point for callers: every operation takes the locator hash
//! explicitly and the engine keeps no per-caller state.
//!
//! ```text
//!   ensure_ready ──► LocatorStore ──► Materializer ──► CacheStore
//!   list / read_page ───────────────► PageServer  ──► CacheStore
//!   clear_all / purge_to_budget ─────────────────────► CacheStore
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{ActiveGuard, CacheStore, EvictionReport, RecoveryReport};
use crate::error::{EngineError, MaterializeError};
use crate::fetch::ArchiveSource;
use crate::locator::{Locator, LocatorStore};
use crate::materialize::{MaterializeOptions, Materializer};
use crate::pages::{PageCache, PageData, PageServer, PageSlice};

/// Default time `ensure_ready` waits before reporting `Processing`.
pub const DEFAULT_READY_WAIT: Duration = Duration::from_secs(30);

/// Readiness of a locator's artifact set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Readiness {
    /// Pages are available
    Ready { total_pages: usize },

    /// Materialization is still running in the background
    Processing,
}

/// Snapshot of cache usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub budget_bytes: u64,
    pub in_flight: usize,
    pub page_cache_entries: usize,
    pub page_cache_bytes: usize,
}

/// Engine construction settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub materialize: MaterializeOptions,

    /// Hot page cache capacity in bytes (0 disables it)
    pub page_cache_bytes: usize,

    /// How long `ensure_ready` blocks before answering `Processing`
    pub ready_wait: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            materialize: MaterializeOptions::default(),
            page_cache_bytes: crate::pages::DEFAULT_PAGE_CACHE_CAPACITY,
            ready_wait: DEFAULT_READY_WAIT,
        }
    }
}

/// Materialization, pagination and cache administration behind one type.
pub struct Engine<S: ArchiveSource, L: LocatorStore> {
    locators: Arc<L>,
    store: Arc<CacheStore>,
    materializer: Materializer<S>,
    pages: PageServer,
    ready_wait: Duration,
}

impl<S: ArchiveSource, L: LocatorStore> Engine<S, L> {
    pub fn new(
        source: S,
        locators: Arc<L>,
        store: Arc<CacheStore>,
        config: EngineConfig,
    ) -> Self {
        let materializer = Materializer::new(source, Arc::clone(&store), config.materialize);
        let pages = PageServer::new(
            Arc::clone(&store),
            PageCache::with_capacity(config.page_cache_bytes),
        );
        Self {
            locators,
            store,
            materializer,
            pages,
            ready_wait: config.ready_wait,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn locators(&self) -> &Arc<L> {
        &self.locators
    }

    pub fn materializer(&self) -> &Materializer<S> {
        &self.materializer
    }

    pub fn ready_wait(&self) -> Duration {
        self.ready_wait
    }

    /// Rebuild the cache index from disk and bring it under budget.
    pub async fn recover(&self) -> Result<RecoveryReport, EngineError> {
        let store = Arc::clone(&self.store);
        let report = tokio::task::spawn_blocking(move || store.recover())
            .await
            .map_err(|e| EngineError::Maintenance(e.to_string()))?
            .map_err(|e| EngineError::Maintenance(e.to_string()))?;
        self.materializer.evict(None).await;
        Ok(report)
    }

    async fn resolve(&self, hash: &str) -> Result<Locator, EngineError> {
        self.locators.resolve(hash).await.ok_or_else(|| {
            MaterializeError::NotFound {
                hash: hash.to_string(),
            }
            .into()
        })
    }

    /// Make sure the artifact set for `hash` exists, waiting up to the
    /// configured ready wait.
    pub async fn ensure_ready(&self, hash: &str) -> Result<Readiness, EngineError> {
        self.ensure_ready_within(hash, self.ready_wait).await
    }

    /// Like [`ensure_ready`](Self::ensure_ready) with an explicit wait.
    ///
    /// On timeout the materialization keeps running and `Processing` is
    /// returned; a later call picks up the same run.
    pub async fn ensure_ready_within(
        &self,
        hash: &str,
        wait: Duration,
    ) -> Result<Readiness, EngineError> {
        let locator = self.resolve(hash).await?;
        let pending = self.materializer.begin(&locator).await;

        match tokio::time::timeout(wait, pending.wait()).await {
            Ok(Ok(entry)) => Ok(Readiness::Ready {
                total_pages: entry.page_count(),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                debug!(hash, wait_ms = wait.as_millis() as u64, "Still materializing");
                Ok(Readiness::Processing)
            }
        }
    }

    /// Whether a Ready entry exists, without starting anything.
    pub fn is_ready(&self, hash: &str) -> bool {
        self.store.contains(hash)
    }

    /// Ordered page slice of a Ready entry.
    pub fn list(&self, hash: &str, offset: i64, limit: usize) -> Result<PageSlice, EngineError> {
        let _lease = self.store.mark_active(hash);
        Ok(self.pages.list(hash, offset, limit)?)
    }

    /// Bytes of one page (1-based).
    pub async fn read_page(&self, hash: &str, page: i64) -> Result<PageData, EngineError> {
        Ok(self.pages.read_page(hash, page).await?)
    }

    /// Pin `hash` as the caller's current selection. Eviction skips it until
    /// the guard is dropped.
    pub fn select(&self, hash: &str) -> ActiveGuard {
        self.store.mark_active(hash)
    }

    /// Delete the whole cache tree and empty the index.
    pub async fn clear_all(&self) -> Result<(), EngineError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.clear_all())
            .await
            .map_err(|e| EngineError::Maintenance(e.to_string()))?
            .map_err(|e| EngineError::Maintenance(e.to_string()))?;
        self.pages.clear_cache().await;
        Ok(())
    }

    /// Run an eviction sweep now.
    pub async fn purge_to_budget(&self) -> EvictionReport {
        let report = self.materializer.evict(None).await;
        for hash in &report.evicted {
            self.pages.invalidate(hash).await;
        }
        report
    }

    /// Drop one locator's cached artifacts. Returns false if nothing was
    /// removed (not cached, or currently active).
    pub async fn forget(&self, hash: &str) -> Result<bool, EngineError> {
        let store = Arc::clone(&self.store);
        let target = hash.to_string();
        let removed = tokio::task::spawn_blocking(move || store.remove(&target))
            .await
            .map_err(|e| EngineError::Maintenance(e.to_string()))?;
        self.pages.invalidate(hash).await;
        if removed.is_some() {
            info!(hash, "Cache entry removed");
        }
        Ok(removed.is_some())
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.store.len(),
            total_bytes: self.store.total_bytes(),
            budget_bytes: self.store.budget(),
            in_flight: self.materializer.in_flight_count().await,
            page_cache_entries: self.pages.cache().len().await,
            page_cache_bytes: self.pages.cache().size().await,
        }
    }
}
