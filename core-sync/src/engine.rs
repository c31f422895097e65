//! # Reconciliation Engine
//!
//! Drives the local cache toward the remote catalog in discrete passes:
//! list, delete stale, fetch new and changed through a bounded pool,
//! rebuild the index. Passes are mutually exclusive and a failed listing
//! never triggers deletions.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use core_ipc::ProgressWriter;
use core_library::{scan_cache_root, LibraryIndex, TagId, AUDIO_FILE, MANIFEST_FILE};

use crate::catalog::RemoteCatalog;
use crate::change::ChangeDetector;
use crate::error::{Result, SyncError};
use crate::fetch::Fetcher;
use crate::store::RemoteStore;

/// Tunables for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on simultaneous artifact downloads.
    pub max_concurrent_downloads: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 5,
        }
    }
}

/// Per-pass reconciliation counters, logged as the pass summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub deleted: usize,
    pub added: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The pass ran to completion against a reachable remote.
    Completed(PassStats),
    /// The remote listing was unreachable or empty; local state was left
    /// untouched and no deletions were performed.
    RemoteUnavailable,
}

/// Drives the cache toward the remote catalog.
///
/// One pass may be in flight at a time; concurrent callers get
/// [`SyncError::PassInFlight`] rather than queueing.
pub struct SyncEngine {
    catalog: RemoteCatalog,
    detector: ChangeDetector,
    fetcher: Fetcher,
    library: Arc<LibraryIndex>,
    progress: Option<ProgressWriter>,
    config: SyncConfig,
    pass_guard: Mutex<()>,
    first_pass_done: AtomicBool,
    downloads: Arc<AtomicU64>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        library: Arc<LibraryIndex>,
        progress: Option<ProgressWriter>,
        config: SyncConfig,
    ) -> Self {
        Self {
            catalog: RemoteCatalog::new(Arc::clone(&store)),
            detector: ChangeDetector::new(Arc::clone(&store)),
            fetcher: Fetcher::new(store),
            library,
            progress,
            config,
            pass_guard: Mutex::new(()),
            first_pass_done: AtomicBool::new(false),
            downloads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether at least one pass has run to completion since startup.
    pub fn has_completed_pass(&self) -> bool {
        self.first_pass_done.load(Ordering::Acquire)
    }

    /// Total artifact downloads performed since construction.
    pub fn downloads_performed(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }

    fn emit_progress(&self, percent: u8, message: &str) {
        if let Some(progress) = &self.progress {
            if let Err(e) = progress.emit(percent, message) {
                debug!(error = %e, "Progress channel write failed");
            }
        }
    }

    /// Run one full reconciliation pass.
    ///
    /// With `force` set, every remote item is refetched regardless of what
    /// the change detector reports.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, force: bool) -> Result<PassOutcome> {
        let _guard = self
            .pass_guard
            .try_lock()
            .map_err(|_| SyncError::PassInFlight)?;

        let root = self.library.root().to_path_buf();
        // The only hard failure in a pass: without a cache root there is
        // nothing to reconcile into.
        tokio::fs::create_dir_all(&root).await?;
        crate::fetch::sweep_temp_files(&root).await?;

        self.emit_progress(0, "starting sync");
        self.detector.begin_pass().await;

        let remote = match self.catalog.list_available().await {
            Ok(tags) if tags.is_empty() => {
                warn!("Remote listing is empty, skipping pass without deletions");
                self.emit_progress(100, "remote unavailable");
                return Ok(PassOutcome::RemoteUnavailable);
            }
            Ok(tags) => tags,
            Err(e) => {
                warn!(error = %e, "Remote store unavailable, skipping pass");
                self.emit_progress(100, "remote unavailable");
                return Ok(PassOutcome::RemoteUnavailable);
            }
        };

        let local_items = scan_cache_root(&root).await?;
        let local_tags: BTreeSet<TagId> =
            local_items.iter().map(|i| i.tag_id.clone()).collect();

        let mut stats = PassStats::default();

        // Remove local items the remote no longer offers. Failures are
        // isolated per item; a stuck directory does not stop the pass.
        for tag in local_tags.difference(&remote) {
            let dir = root.join(tag.as_str());
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    info!(tag = %tag, "Removed sound no longer on remote");
                    stats.deleted += 1;
                }
                Err(e) => {
                    warn!(tag = %tag, error = %e, "Failed to remove stale directory");
                    stats.failed += 1;
                }
            }
        }

        // Decide what each remote item needs.
        let mut plans: Vec<(TagId, Vec<&'static str>, bool)> = Vec::new();
        for tag in &remote {
            let local = local_items.iter().find(|i| &i.tag_id == tag);
            let is_new = local.is_none();

            let mut files = Vec::new();
            if force {
                files.push(MANIFEST_FILE);
                files.push(AUDIO_FILE);
            } else {
                let manifest_hash = local.map(|i| i.fingerprint.manifest.as_str());
                let audio_hash = local.map(|i| i.fingerprint.audio.as_str());
                if self
                    .detector
                    .needs_update(manifest_hash, &format!("{tag}/{MANIFEST_FILE}"))
                    .await
                    .requires_fetch()
                {
                    files.push(MANIFEST_FILE);
                }
                if self
                    .detector
                    .needs_update(audio_hash, &format!("{tag}/{AUDIO_FILE}"))
                    .await
                    .requires_fetch()
                {
                    files.push(AUDIO_FILE);
                }
            }

            if !files.is_empty() {
                plans.push((tag.clone(), files, is_new));
            }
        }

        let total = plans.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_downloads));
        let mut fetches = JoinSet::new();

        for (tag, files, is_new) in plans {
            let fetcher = self.fetcher.clone();
            let semaphore = Arc::clone(&semaphore);
            let downloads = Arc::clone(&self.downloads);
            let dir = root.join(tag.as_str());
            fetches.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = async {
                    tokio::fs::create_dir_all(&dir).await?;
                    for file in &files {
                        fetcher.download(&format!("{tag}/{file}"), &dir.join(file)).await?;
                        downloads.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok::<_, SyncError>(())
                }
                .await;
                (tag, is_new, result)
            });
        }

        let mut done = 0usize;
        while let Some(joined) = fetches.join_next().await {
            let Ok((tag, is_new, result)) = joined else {
                stats.failed += 1;
                continue;
            };
            done += 1;
            match result {
                Ok(()) => {
                    if is_new {
                        info!(tag = %tag, "Downloaded new sound");
                        stats.added += 1;
                    } else {
                        info!(tag = %tag, "Updated changed sound");
                        stats.updated += 1;
                    }
                }
                Err(e) => {
                    warn!(tag = %tag, error = %e, "Failed to sync sound");
                    stats.failed += 1;
                }
            }
            let percent = if total == 0 {
                100
            } else {
                ((done * 100) / total).min(99) as u8
            };
            self.emit_progress(percent, &format!("synced {tag}"));
        }

        let indexed = self.library.rebuild().await?;
        self.first_pass_done.store(true, Ordering::Release);
        self.emit_progress(100, "sync complete");

        info!(
            deleted = stats.deleted,
            added = stats.added,
            updated = stats.updated,
            failed = stats.failed,
            indexed,
            "Reconciliation pass complete"
        );
        Ok(PassOutcome::Completed(stats))
    }

    /// Fetch a single item on demand, then refresh the index.
    ///
    /// Used while the first pass has not yet completed and a scan arrives
    /// for a tag the cache does not hold. Waits for any in-flight pass
    /// instead of skipping.
    #[instrument(skip(self))]
    pub async fn fetch_item(&self, tag_id: &TagId) -> Result<()> {
        let _guard = self.pass_guard.lock().await;

        let dir = self.library.root().join(tag_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        for file in [MANIFEST_FILE, AUDIO_FILE] {
            self.fetcher
                .download(&format!("{tag_id}/{file}"), &dir.join(file))
                .await
                .map_err(|e| match e {
                    SyncError::Network(_) => SyncError::NotAvailable(tag_id.to_string()),
                    other => other,
                })?;
            self.downloads.fetch_add(1, Ordering::Relaxed);
        }

        self.library.rebuild().await?;
        Ok(())
    }
}
