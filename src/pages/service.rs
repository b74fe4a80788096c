//! Page Server: pagination and page bytes over Ready entries.

use std::io::ErrorKind;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStore, PageArtifact};
use crate::error::PageError;
use crate::transcode::PAGE_CONTENT_TYPE;

use super::cache::{PageCache, PageCacheKey};

/// Largest page batch a single `list` call returns.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Batch size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: usize = 5;

/// Reference to one page inside a slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageHandle {
    /// 1-based page number
    pub page: usize,

    /// Size in bytes
    pub size: u64,
}

/// A window of an entry's pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSlice {
    pub pages: Vec<PageHandle>,

    /// Offset the slice starts at (0-based)
    pub offset: usize,

    pub total_pages: usize,
}

/// Bytes of one page.
#[derive(Debug, Clone)]
pub struct PageData {
    pub page: usize,
    pub data: Bytes,
    pub content_type: &'static str,

    /// Whether the bytes came from the hot page cache
    pub cache_hit: bool,
}

/// Serves pages of Ready entries.
///
/// Every call refreshes the entry's last-access time. Reads hold an active
/// lease on the entry so eviction cannot delete the file underneath them.
pub struct PageServer {
    store: Arc<CacheStore>,
    cache: PageCache,
}

impl PageServer {
    pub fn new(store: Arc<CacheStore>, cache: PageCache) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    fn entry(&self, hash: &str) -> Result<Arc<CacheEntry>, PageError> {
        self.store
            .access(hash)
            .filter(|entry| entry.page_count() > 0)
            .ok_or_else(|| PageError::NotFound {
                hash: hash.to_string(),
            })
    }

    /// Up to `limit` pages starting at the 0-based `offset`.
    ///
    /// `limit` is clamped to `1..=MAX_PAGE_LIMIT`. An offset at or past the end
    /// yields an empty slice.
    pub fn list(&self, hash: &str, offset: i64, limit: usize) -> Result<PageSlice, PageError> {
        if offset < 0 {
            return Err(PageError::InvalidOffset { offset });
        }
        let entry = self.entry(hash)?;
        let total_pages = entry.page_count();
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);

        let pages = entry
            .pages()
            .iter()
            .skip(offset)
            .take(limit)
            .map(|p| PageHandle {
                page: p.index,
                size: p.size,
            })
            .collect();

        Ok(PageSlice {
            pages,
            offset,
            total_pages,
        })
    }

    /// Look up one page by 1-based number.
    pub fn get_one(&self, hash: &str, page: i64) -> Result<PageArtifact, PageError> {
        let entry = self.entry(hash)?;
        page_of(&entry, page).cloned()
    }

    /// Read one page's bytes, from the hot cache when possible.
    pub async fn read_page(&self, hash: &str, page: i64) -> Result<PageData, PageError> {
        let _lease = self.store.mark_active(hash);
        let entry = self.entry(hash)?;
        let artifact = page_of(&entry, page)?;
        let key = PageCacheKey::new(hash, entry.generation(), artifact.index);

        if let Some(data) = self.cache.get(&key).await {
            return Ok(PageData {
                page: artifact.index,
                data,
                content_type: PAGE_CONTENT_TYPE,
                cache_hit: true,
            });
        }

        let data = match tokio::fs::read(&artifact.path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(hash, page = artifact.index, "Page file vanished");
                return Err(PageError::NotFound {
                    hash: hash.to_string(),
                });
            }
            Err(e) => return Err(PageError::Io(e.to_string())),
        };
        self.cache.put(key, data.clone()).await;

        Ok(PageData {
            page: artifact.index,
            data,
            content_type: PAGE_CONTENT_TYPE,
            cache_hit: false,
        })
    }

    /// Forget cached bytes of one locator.
    pub async fn invalidate(&self, hash: &str) {
        self.cache.remove_archive(hash).await;
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}

fn page_of(entry: &CacheEntry, page: i64) -> Result<&PageArtifact, PageError> {
    usize::try_from(page)
        .ok()
        .and_then(|index| entry.page(index))
        .ok_or(PageError::PageNotFound {
            page,
            total: entry.page_count(),
        })
}
