//! Cache Store: index of ready artifact sets and the eviction policy.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::clock::{millis_since_epoch, Clock, SystemClock};
use super::layout::{
    is_archive_name, is_entry_name, parse_page_file_name, CacheLayout, PARTIAL_SUFFIX,
    STAGING_PREFIX, TRASH_PREFIX,
};

// =============================================================================
// Entries
// =============================================================================

/// One transcoded page on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArtifact {
    /// 1-based page number
    pub index: usize,

    /// Absolute path of the page file
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

/// A Ready artifact set.
///
/// Entries are immutable once registered: re-materializing a locator produces a
/// new entry with a new generation.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    hash: String,
    entry_dir: PathBuf,
    archive_path: Option<PathBuf>,
    pages: Vec<PageArtifact>,
    total_bytes: u64,
    generation: u64,
}

impl CacheEntry {
    /// Build an entry from its published pages and optional kept archive.
    pub fn new(
        hash: impl Into<String>,
        entry_dir: impl Into<PathBuf>,
        pages: Vec<PageArtifact>,
        archive: Option<(PathBuf, u64)>,
    ) -> Self {
        let page_bytes: u64 = pages.iter().map(|p| p.size).sum();
        let archive_bytes = archive.as_ref().map(|(_, size)| *size).unwrap_or(0);
        Self {
            hash: hash.into(),
            entry_dir: entry_dir.into(),
            archive_path: archive.map(|(path, _)| path),
            pages,
            total_bytes: page_bytes + archive_bytes,
            generation: 0,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn entry_dir(&self) -> &Path {
        &self.entry_dir
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_path.as_deref()
    }

    /// Pages in order; `pages()[i].index == i + 1`.
    pub fn pages(&self) -> &[PageArtifact] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 1-based lookup.
    pub fn page(&self, index: usize) -> Option<&PageArtifact> {
        index.checked_sub(1).and_then(|i| self.pages.get(i))
    }

    /// Bytes on disk: all pages plus the kept archive.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Store-assigned registration number, unique per process.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of an eviction sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Hashes removed, oldest first
    pub evicted: Vec<String>,

    /// Bytes released from the index
    pub freed_bytes: u64,

    /// Indexed bytes after the sweep
    pub total_bytes: u64,
}

/// Outcome of start-up recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries registered from disk
    pub restored: usize,

    /// Leftover or malformed paths deleted
    pub removed: usize,

    /// Unindexed entry directories kept for their downloaded archive
    pub reusable: usize,
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug)]
struct Record {
    entry: Arc<CacheEntry>,
    last_access: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<String, Record>,
    active: HashMap<String, usize>,
    total_bytes: u64,
    next_generation: u64,
}

impl StoreState {
    fn insert(&mut self, mut entry: CacheEntry, last_access: u64) -> Arc<CacheEntry> {
        self.next_generation += 1;
        entry.generation = self.next_generation;
        let entry = Arc::new(entry);

        self.total_bytes += entry.total_bytes;
        let previous = self.records.insert(
            entry.hash.clone(),
            Record {
                entry: Arc::clone(&entry),
                last_access,
            },
        );
        if let Some(previous) = previous {
            self.total_bytes -= previous.entry.total_bytes;
        }
        entry
    }

    fn is_active(&self, hash: &str) -> bool {
        self.active.get(hash).is_some_and(|&n| n > 0)
    }
}

/// Index of Ready entries with last-access tracking and a byte budget.
///
/// All bookkeeping happens under one lock. The only filesystem work done
/// while holding it is renaming evicted directories to trash.
#[derive(Debug)]
pub struct CacheStore {
    layout: CacheLayout,
    budget: u64,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<StoreState>>,
    trash_nonce: AtomicU64,
}

impl CacheStore {
    /// Create a store using the wall clock.
    pub fn new(layout: CacheLayout, budget: u64) -> Self {
        Self::with_clock(layout, budget, Arc::new(SystemClock))
    }

    pub fn with_clock(layout: CacheLayout, budget: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            layout,
            budget,
            clock,
            state: Arc::new(Mutex::new(StoreState::default())),
            trash_nonce: AtomicU64::new(0),
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Maximum indexed bytes before eviction kicks in.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Look up an entry without touching it.
    pub fn get(&self, hash: &str) -> Option<Arc<CacheEntry>> {
        self.state
            .lock()
            .records
            .get(hash)
            .map(|r| Arc::clone(&r.entry))
    }

    /// Look up an entry and mark it as just used.
    pub fn access(&self, hash: &str) -> Option<Arc<CacheEntry>> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        let record = state.records.get_mut(hash)?;
        record.last_access = now;
        Some(Arc::clone(&record.entry))
    }

    /// Refresh an entry's last-access time. Returns false if it is not indexed.
    pub fn touch(&self, hash: &str) -> bool {
        self.access(hash).is_some()
    }

    /// Register a Ready entry, replacing any previous one for the same hash.
    pub fn put(&self, entry: CacheEntry) -> Arc<CacheEntry> {
        let now = self.clock.now_millis();
        let entry = self.state.lock().insert(entry, now);
        debug!(
            hash = %entry.hash,
            pages = entry.page_count(),
            bytes = entry.total_bytes,
            "Cache entry registered"
        );
        entry
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.state.lock().records.contains_key(hash)
    }

    pub fn size_of(&self, hash: &str) -> Option<u64> {
        self.state
            .lock()
            .records
            .get(hash)
            .map(|r| r.entry.total_bytes)
    }

    pub fn last_access(&self, hash: &str) -> Option<u64> {
        self.state.lock().records.get(hash).map(|r| r.last_access)
    }

    /// Sum of all indexed entry sizes.
    pub fn total_bytes(&self) -> u64 {
        self.state.lock().total_bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indexed hashes, sorted.
    pub fn hashes(&self) -> Vec<String> {
        let mut hashes: Vec<String> = self.state.lock().records.keys().cloned().collect();
        hashes.sort();
        hashes
    }

    // =========================================================================
    // Active leases
    // =========================================================================

    /// Pin an entry so eviction skips it until the guard is dropped.
    ///
    /// Leases are counted; the hash need not be indexed yet.
    pub fn mark_active(&self, hash: &str) -> ActiveGuard {
        *self.state.lock().active.entry(hash.to_string()).or_insert(0) += 1;
        ActiveGuard {
            state: Arc::clone(&self.state),
            hash: hash.to_string(),
        }
    }

    pub fn is_active(&self, hash: &str) -> bool {
        self.state.lock().is_active(hash)
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    /// Drive the indexed total back under budget.
    ///
    /// Candidates are every indexed entry except `exclude` and active ones,
    /// oldest access first with the hash as tie-break. Victims leave the index
    /// and their directories move to trash under the lock, so a run started
    /// for the same hash right after finds a clean slot. The recursive delete
    /// happens after the lock is released.
    pub fn evict_to_budget(&self, exclude: Option<&str>) -> EvictionReport {
        let (victims, total_bytes) = {
            let mut state = self.state.lock();
            if state.total_bytes <= self.budget {
                return EvictionReport {
                    total_bytes: state.total_bytes,
                    ..Default::default()
                };
            }

            let mut candidates: Vec<(u64, String)> = state
                .records
                .iter()
                .filter(|(hash, _)| Some(hash.as_str()) != exclude && !state.is_active(hash))
                .map(|(hash, record)| (record.last_access, hash.clone()))
                .collect();
            candidates.sort();

            let mut victims = Vec::new();
            for (_, hash) in candidates {
                if state.total_bytes <= self.budget {
                    break;
                }
                if let Some(record) = state.records.remove(&hash) {
                    state.total_bytes -= record.entry.total_bytes;
                    let trash = self.move_to_trash(&hash);
                    victims.push((record.entry, trash));
                }
            }
            (victims, state.total_bytes)
        };

        let mut report = EvictionReport {
            total_bytes,
            ..Default::default()
        };
        for (victim, trash) in victims {
            if let Some(trash) = trash {
                purge_dir(&trash);
            }
            info!(hash = %victim.hash, bytes = victim.total_bytes, "Evicted cache entry");
            report.freed_bytes += victim.total_bytes;
            report.evicted.push(victim.hash.clone());
        }

        if report.total_bytes > self.budget {
            warn!(
                total = report.total_bytes,
                budget = self.budget,
                "Cache over budget; remaining entries are active or excluded"
            );
        }
        report
    }

    /// Remove one entry from the index and disk.
    ///
    /// Active entries are left alone and `None` is returned.
    pub fn remove(&self, hash: &str) -> Option<Arc<CacheEntry>> {
        let (entry, trash) = {
            let mut state = self.state.lock();
            if state.is_active(hash) {
                return None;
            }
            let record = state.records.remove(hash)?;
            state.total_bytes -= record.entry.total_bytes;
            (record.entry, self.move_to_trash(hash))
        };
        if let Some(trash) = trash {
            purge_dir(&trash);
        }
        Some(entry)
    }

    /// Empty the index and delete the whole cache tree.
    ///
    /// Active leases survive; work in progress inside the tree fails.
    pub fn clear_all(&self) -> io::Result<()> {
        {
            let mut state = self.state.lock();
            state.records.clear();
            state.total_bytes = 0;
        }

        let root = self.layout.root();
        if root.exists() {
            for dir_entry in fs::read_dir(root)? {
                let path = dir_entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        }
        fs::create_dir_all(root)?;
        info!(root = %root.display(), "Cache cleared");
        Ok(())
    }

    /// Rename the entry directory out of the way.
    ///
    /// Returns the path left to delete, which is the entry directory itself
    /// when the rename fails for a reason other than it being gone.
    fn move_to_trash(&self, hash: &str) -> Option<PathBuf> {
        let dir = self.layout.entry_dir(hash);
        let nonce = self.trash_nonce.fetch_add(1, Ordering::Relaxed);
        let trash = self.layout.trash_dir(hash, nonce);

        match fs::rename(&dir, &trash) {
            Ok(()) => Some(trash),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(hash, error = %e, "Could not move entry to trash, deleting in place");
                Some(dir)
            }
        }
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Rebuild the index from the cache tree after a restart.
    ///
    /// Leftover staging, trash and partial-download paths are deleted. Each
    /// entry directory with a contiguous run of page files is registered, with
    /// its last access seeded from the pages directory's mtime. An entry
    /// directory without usable pages keeps a finished archive download (its
    /// stale pages are dropped) so the next run skips the fetch; anything else
    /// is deleted.
    pub fn recover(&self) -> io::Result<RecoveryReport> {
        let root = self.layout.root();
        fs::create_dir_all(root)?;
        let mut report = RecoveryReport::default();

        for dir_entry in fs::read_dir(root)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let name = dir_entry.file_name().to_string_lossy().into_owned();

            if name.starts_with(TRASH_PREFIX) {
                remove_path(&path);
                report.removed += 1;
                continue;
            }
            if !is_entry_name(&name) || !dir_entry.file_type()?.is_dir() {
                debug!(path = %path.display(), "Ignoring unknown path in cache root");
                continue;
            }

            report.removed += clean_entry_dir(&path)?;
            match self.scan_entry(&name)? {
                Some((entry, last_access)) => {
                    self.state.lock().insert(entry, last_access);
                    report.restored += 1;
                }
                None if has_finished_archive(&path)? => {
                    let pages_dir = self.layout.pages_dir(&name);
                    if pages_dir.exists() {
                        remove_path(&pages_dir);
                        report.removed += 1;
                    }
                    debug!(hash = %name, "Keeping downloaded archive for reuse");
                    report.reusable += 1;
                }
                None => {
                    debug!(hash = %name, "Dropping cache entry without pages");
                    remove_path(&path);
                    report.removed += 1;
                }
            }
        }

        info!(
            restored = report.restored,
            removed = report.removed,
            reusable = report.reusable,
            bytes = self.total_bytes(),
            "Cache recovered"
        );
        Ok(report)
    }

    fn scan_entry(&self, hash: &str) -> io::Result<Option<(CacheEntry, u64)>> {
        let entry_dir = self.layout.entry_dir(hash);
        let pages_dir = self.layout.pages_dir(hash);
        if !pages_dir.is_dir() {
            return Ok(None);
        }

        let mut found = Vec::new();
        for file in fs::read_dir(&pages_dir)? {
            let file = file?;
            let name = file.file_name().to_string_lossy().into_owned();
            if let Some(index) = parse_page_file_name(&name) {
                found.push((index, file.path(), file.metadata()?.len()));
            }
        }
        found.sort_by_key(|(index, _, _)| *index);

        let contiguous = found.iter().enumerate().all(|(i, (index, _, _))| *index == i + 1);
        if found.is_empty() || !contiguous {
            return Ok(None);
        }

        let mut archive = None;
        for file in fs::read_dir(&entry_dir)? {
            let file = file?;
            if is_archive_name(&file.file_name().to_string_lossy()) {
                archive = Some((file.path(), file.metadata()?.len()));
                break;
            }
        }

        let last_access = fs::metadata(&pages_dir)?
            .modified()
            .map(millis_since_epoch)
            .unwrap_or_else(|_| self.clock.now_millis());

        let pages = found
            .into_iter()
            .map(|(index, path, size)| PageArtifact { index, path, size })
            .collect();
        Ok(Some((
            CacheEntry::new(hash, entry_dir, pages, archive),
            last_access,
        )))
    }
}

/// Delete in-progress leftovers inside one entry directory.
fn clean_entry_dir(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for file in fs::read_dir(dir)? {
        let file = file?;
        let name = file.file_name().to_string_lossy().into_owned();
        if name.starts_with(STAGING_PREFIX) || name.ends_with(PARTIAL_SUFFIX) {
            remove_path(&file.path());
            removed += 1;
        }
    }
    Ok(removed)
}

fn has_finished_archive(dir: &Path) -> io::Result<bool> {
    for file in fs::read_dir(dir)? {
        let file = file?;
        if is_archive_name(&file.file_name().to_string_lossy()) && file.file_type()?.is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn purge_dir(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %e, "Failed to delete cache entry");
    }
}

fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Failed to remove leftover cache path");
    }
}

// =============================================================================
// Active Guard
// =============================================================================

/// Lease that keeps an entry out of eviction while held.
#[derive(Debug)]
pub struct ActiveGuard {
    state: Arc<Mutex<StoreState>>,
    hash: String,
}

impl ActiveGuard {
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(count) = state.active.get_mut(&self.hash) {
            *count -= 1;
            if *count == 0 {
                state.active.remove(&self.hash);
            }
        }
    }
}
