//! Page delivery.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               PageServer                │
//! │  list / get_one / read_page             │
//! │  ┌───────────────┐  ┌────────────────┐  │
//! │  │  PageCache    │  │  CacheStore    │  │
//! │  │  (hot bytes)  │  │  (entries)     │  │
//! │  └───────────────┘  └────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```

mod cache;
mod service;

pub use cache::{PageCache, PageCacheKey, DEFAULT_PAGE_CACHE_CAPACITY};
pub use service::{
    PageData, PageHandle, PageServer, PageSlice, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
