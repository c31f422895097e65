//! # Remote Catalog
//!
//! Derives the set of fully available remote tags from the store's
//! directory listing plus per-tag existence probes.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use core_library::{TagId, AUDIO_FILE, MANIFEST_FILE};

use crate::error::Result;
use crate::store::RemoteStore;

/// Max concurrent existence probes against the remote store.
const PROBE_CONCURRENCY: usize = 8;

/// Parse an HTML directory listing into the set of tag directories it
/// advertises. Only numeric directory names are kept; everything else in
/// the listing (parent links, stray files, non-tag dirs) is ignored.
pub fn parse_listing(html: &str) -> BTreeSet<TagId> {
    let mut tags = BTreeSet::new();
    for line in html.lines() {
        let Some(rest) = line.split("<a href=\"").nth(1) else {
            continue;
        };
        let Some(name) = rest.split("/\">").next() else {
            continue;
        };
        if let Ok(tag) = name.parse::<TagId>() {
            tags.insert(tag);
        }
    }
    tags
}

/// View of what the remote store currently offers.
pub struct RemoteCatalog {
    store: Arc<dyn RemoteStore>,
}

impl RemoteCatalog {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// List the tags that are fully available on the remote store, meaning
    /// the tag directory appears in the root listing and holds both a
    /// manifest and an audio file. Candidates whose probes fail are skipped
    /// rather than failing the whole listing.
    #[instrument(skip(self))]
    pub async fn list_available(&self) -> Result<BTreeSet<TagId>> {
        let html = self.store.list_root().await?;
        let candidates = parse_listing(&html);
        debug!(candidates = candidates.len(), "Parsed remote listing");

        let semaphore = Arc::new(Semaphore::new(PROBE_CONCURRENCY));
        let mut probes = JoinSet::new();

        for tag in candidates {
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            probes.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let manifest = store.exists(&format!("{tag}/{MANIFEST_FILE}")).await;
                let audio = store.exists(&format!("{tag}/{AUDIO_FILE}")).await;
                match (manifest, audio) {
                    (Ok(true), Ok(true)) => Some(tag),
                    (Ok(_), Ok(_)) => {
                        warn!(%tag, "Remote tag is missing required files, skipping");
                        None
                    }
                    (m, a) => {
                        let err = m.err().or_else(|| a.err());
                        warn!(%tag, error = ?err, "Probe failed for remote tag, skipping");
                        None
                    }
                }
            });
        }

        let mut available = BTreeSet::new();
        while let Some(joined) = probes.join_next().await {
            if let Ok(Some(tag)) = joined {
                available.insert(tag);
            }
        }
        Ok(available)
    }
}
