//! # Artifact Download
//!
//! Atomic replacement of cache files and cleanup of the temp files the
//! replacement scheme leaves behind when interrupted.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};
use crate::store::RemoteStore;

/// Downloads remote artifacts into the cache with atomic replacement. The
/// body is written to a sibling temp file first and renamed over the final
/// path only once the write succeeds, so a partial download never clobbers
/// a good local copy.
#[derive(Clone)]
pub struct Fetcher {
    store: Arc<dyn RemoteStore>,
}

impl Fetcher {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn download(&self, rel: &str, final_path: &Path) -> Result<()> {
        let body = self.store.fetch(rel).await?;
        if body.is_empty() {
            return Err(SyncError::Integrity {
                path: final_path.to_path_buf(),
            });
        }

        let file_name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download");
        let tmp_path = final_path.with_file_name(format!("{file_name}.tmp"));

        let write_result = async {
            tokio::fs::write(&tmp_path, &body).await?;
            tokio::fs::rename(&tmp_path, final_path).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!(rel, bytes = body.len(), "Downloaded artifact");
        Ok(())
    }
}

/// Remove `.tmp` files orphaned by an interrupted download.
///
/// Walks the item directories under `root`. Runs at the start of every
/// reconciliation pass, so a crash mid-write leaves garbage for at most
/// one sync interval.
pub async fn sweep_temp_files(root: &Path) -> Result<()> {
    let mut dirs = tokio::fs::read_dir(root).await?;
    while let Some(entry) = dirs.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let mut files = tokio::fs::read_dir(entry.path()).await?;
        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tmp") {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed stray temp file"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove stray temp file")
                }
            }
        }
    }
    Ok(())
}
