//! Disk cache of materialized archives.
//!
//! - [`CacheLayout`]: where entry directories, archives and pages live
//! - [`CacheStore`]: index of Ready entries, last-access tracking, active
//!   leases, budget-driven eviction and start-up recovery
//! - [`Clock`]: injectable time source for last-access stamps

mod clock;
mod layout;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use layout::{
    page_file_name, parse_page_file_name, CacheLayout, MAX_PAGES, PAGE_NAME_DIGITS,
    PARTIAL_SUFFIX, STAGING_PREFIX, TRASH_PREFIX,
};
pub use store::{
    ActiveGuard, CacheEntry, CacheStore, EvictionReport, PageArtifact, RecoveryReport,
};
