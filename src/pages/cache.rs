//! Hot page cache.
//!
//! Keeps recently served page bytes in memory so repeated reads of the same
//! page skip the filesystem.
//!
//! # Cache Key
//!
//! Pages are cached by:
//! - Locator hash
//! - Entry generation (a re-materialized archive never serves stale bytes)
//! - Page number
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total size of cached pages in bytes and evicts
//! least-recently-used pages when the capacity is exceeded.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default cache capacity: 64MB
pub const DEFAULT_PAGE_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Bound on LRU bookkeeping
const DEFAULT_MAX_ENTRIES: usize = 4_096;

/// Cache key for one page of one entry generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCacheKey {
    pub hash: Arc<str>,
    pub generation: u64,
    pub page: usize,
}

impl PageCacheKey {
    pub fn new(hash: impl Into<Arc<str>>, generation: u64, page: usize) -> Self {
        Self {
            hash: hash.into(),
            generation,
            page,
        }
    }
}

struct CacheState {
    lru: LruCache<PageCacheKey, Bytes>,
    size: usize,
}

/// LRU cache of page bytes with a byte capacity.
pub struct PageCache {
    state: Mutex<CacheState>,
    max_size: usize,
}

impl PageCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PAGE_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes. Zero disables caching.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                lru: LruCache::new(max_entries),
                size: 0,
            }),
            max_size,
        }
    }

    /// Get a page, marking it recently used.
    pub async fn get(&self, key: &PageCacheKey) -> Option<Bytes> {
        self.state.lock().await.lru.get(key).cloned()
    }

    pub async fn contains(&self, key: &PageCacheKey) -> bool {
        self.state.lock().await.lru.contains(key)
    }

    /// Store a page, evicting least-recently-used pages while over capacity.
    ///
    /// Pages larger than the whole capacity are not stored.
    pub async fn put(&self, key: PageCacheKey, data: Bytes) {
        if data.len() > self.max_size {
            return;
        }

        let mut state = self.state.lock().await;
        let data_size = data.len();

        // Returns either the replaced value or the page pushed out by the
        // entry-count bound.
        if let Some((_, displaced)) = state.lru.push(key, data) {
            state.size = state.size.saturating_sub(displaced.len());
        }
        state.size += data_size;

        while state.size > self.max_size {
            match state.lru.pop_lru() {
                Some((_, evicted)) => state.size = state.size.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    /// Drop every cached page of one locator, across generations.
    pub async fn remove_archive(&self, hash: &str) -> usize {
        let mut state = self.state.lock().await;
        let keys: Vec<PageCacheKey> = state
            .lru
            .iter()
            .filter(|(key, _)| &*key.hash == hash)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            if let Some(data) = state.lru.pop(key) {
                state.size = state.size.saturating_sub(data.len());
            }
        }
        keys.len()
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.lru.clear();
        state.size = 0;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.lru.is_empty()
    }

    /// Current total size of cached pages in bytes.
    pub async fn size(&self) -> usize {
        self.state.lock().await.size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}
