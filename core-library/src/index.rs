//! # Library Index
//!
//! In-memory index of the on-disk cache, mapping tag ids to validated
//! content items. The index is a pure derivation of disk state: it is
//! rebuilt wholesale after each reconciliation pass and swapped atomically,
//! so readers never observe a half-rebuilt mapping.

use crate::error::Result;
use crate::item::{ContentItem, TagId};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Scan the cache root for valid item directories.
///
/// Enumerates digit-named subdirectories, validates each (both required
/// files present, manifest parses), and returns the survivors. Invalid
/// directories are logged and skipped; they are treated as absent
/// everywhere else.
pub async fn scan_cache_root(root: &Path) -> Result<Vec<ContentItem>> {
    let mut items = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Ok(tag_id) = TagId::new(&name.to_string_lossy()) else {
            continue;
        };
        match ContentItem::load(root, tag_id.clone()).await {
            Ok(item) => items.push(item),
            Err(e) => {
                warn!(tag_id = %tag_id, error = %e, "skipping invalid cache directory");
            }
        }
    }

    Ok(items)
}

/// Read-only index over the local cache, rebuilt from disk on demand.
pub struct LibraryIndex {
    root: PathBuf,
    items: RwLock<HashMap<TagId, Arc<ContentItem>>>,
}

impl LibraryIndex {
    /// Create an empty index rooted at the cache directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescan the cache root and atomically replace the mapping.
    ///
    /// Returns the number of indexed items. After this returns, index
    /// contents exactly equal the set of valid directories on disk.
    pub async fn rebuild(&self) -> Result<usize> {
        let scanned = scan_cache_root(&self.root).await?;
        let map: HashMap<TagId, Arc<ContentItem>> = scanned
            .into_iter()
            .map(|item| (item.tag_id.clone(), Arc::new(item)))
            .collect();
        let count = map.len();
        *self.items.write().await = map;
        debug!(items = count, root = %self.root.display(), "library index rebuilt");
        Ok(count)
    }

    /// O(1) lookup of a cached item.
    pub async fn lookup(&self, tag_id: &TagId) -> Option<Arc<ContentItem>> {
        self.items.read().await.get(tag_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Sorted set of every indexed tag id.
    pub async fn tag_ids(&self) -> BTreeSet<TagId> {
        self.items.read().await.keys().cloned().collect()
    }
}
