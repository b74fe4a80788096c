//! In-memory catalog of saved locators.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::Locator;
use crate::error::LocatorError;

/// Metadata lookup consumed by the engine.
///
/// The engine only ever reads through this trait; it never mutates the store.
#[async_trait]
pub trait LocatorStore: Send + Sync {
    /// Resolve a locator hash to its source metadata.
    async fn resolve(&self, hash: &str) -> Option<Locator>;
}

/// On-disk catalog format.
///
/// ```json
/// { "archives": [ { "url": "https://example.com/book.cbz", "title": "Book" } ] }
/// ```
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub archives: Vec<CatalogEntry>,
}

/// One archive listed in a [`CatalogFile`].
#[derive(Debug, Deserialize)]
pub struct CatalogEntry {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Thread-safe in-memory [`LocatorStore`].
#[derive(Default)]
pub struct Catalog {
    entries: RwLock<HashMap<String, Locator>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, LocatorError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LocatorError::Catalog(format!("{}: {}", path.display(), e)))?;
        let file: CatalogFile = serde_json::from_str(&raw)
            .map_err(|e| LocatorError::Catalog(format!("{}: {}", path.display(), e)))?;

        let catalog = Self::new();
        for entry in file.archives {
            let locator = match entry.title {
                Some(title) => Locator::with_title(&entry.url, title)?,
                None => Locator::from_url(&entry.url)?,
            };
            // Duplicates in the file are tolerated; the first one wins.
            if let Err(LocatorError::Duplicate { hash }) = catalog.add_locator(locator).await {
                debug!(hash = %hash, "Skipping duplicate catalog entry");
            }
        }

        info!(count = catalog.len().await, "Loaded catalog from {}", path.display());
        Ok(catalog)
    }

    /// Add an archive by URL.
    pub async fn add(&self, url: &str) -> Result<Locator, LocatorError> {
        let locator = Locator::from_url(url)?;
        self.add_locator(locator.clone()).await?;
        Ok(locator)
    }

    /// Add a pre-built locator. Fails if its hash is already present.
    pub async fn add_locator(&self, locator: Locator) -> Result<(), LocatorError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(locator.hash()) {
            return Err(LocatorError::Duplicate {
                hash: locator.hash().to_string(),
            });
        }
        entries.insert(locator.hash().to_string(), locator);
        Ok(())
    }

    /// Remove a locator, returning it if it existed.
    pub async fn remove(&self, hash: &str) -> Option<Locator> {
        self.entries.write().await.remove(hash)
    }

    /// All locators, ordered by title then hash.
    pub async fn list(&self) -> Vec<Locator> {
        let entries = self.entries.read().await;
        let mut list: Vec<Locator> = entries.values().cloned().collect();
        list.sort_by(|a, b| a.title().cmp(b.title()).then_with(|| a.hash().cmp(b.hash())));
        list
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl LocatorStore for Catalog {
    async fn resolve(&self, hash: &str) -> Option<Locator> {
        self.entries.read().await.get(hash).cloned()
    }
}
