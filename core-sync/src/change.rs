//! # Change Detection
//!
//! Decides whether a cached artifact is stale relative to the remote copy.
//! There is exactly one strategy: compare SHA-256 content hashes. Filesystem
//! timestamps play no part, so a touched-but-identical file stays put and a
//! changed file with a stale mtime is still refetched.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use core_library::sha256_hex;

use crate::store::RemoteStore;

/// Result of comparing a local artifact against its remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Local content matches the remote.
    Unchanged,
    /// Remote content differs from the local copy, or no local copy exists.
    Changed,
    /// The comparison could not be made, usually because the remote hash
    /// could not be computed. Treated as stale so the item gets refetched.
    Unknown,
}

impl Freshness {
    pub fn requires_fetch(&self) -> bool {
        matches!(self, Freshness::Changed | Freshness::Unknown)
    }
}

/// Content-hash change detector. A remote artifact counts as changed when
/// its SHA-256 digest differs from the digest of the local copy.
///
/// Remote digests are memoized for the duration of a pass so a file is
/// downloaded at most once for comparison purposes; `begin_pass` clears the
/// memo so the next pass sees fresh content.
pub struct ChangeDetector {
    store: Arc<dyn RemoteStore>,
    remote_hashes: Mutex<HashMap<String, String>>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            remote_hashes: Mutex::new(HashMap::new()),
        }
    }

    /// Reset the per-pass memo of remote digests.
    pub async fn begin_pass(&self) {
        self.remote_hashes.lock().await.clear();
    }

    /// Compare the local digest (if any) of an artifact against the remote
    /// copy at `rel`.
    pub async fn needs_update(&self, local: Option<&str>, rel: &str) -> Freshness {
        let Some(local) = local else {
            return Freshness::Changed;
        };

        let remote = {
            let memo = self.remote_hashes.lock().await;
            memo.get(rel).cloned()
        };

        let remote = match remote {
            Some(hash) => hash,
            None => match self.store.fetch(rel).await {
                Ok(body) => {
                    let hash = sha256_hex(&body);
                    self.remote_hashes
                        .lock()
                        .await
                        .insert(rel.to_string(), hash.clone());
                    hash
                }
                Err(e) => {
                    debug!(rel, error = %e, "Could not hash remote artifact");
                    return Freshness::Unknown;
                }
            },
        };

        if remote == local {
            Freshness::Unchanged
        } else {
            Freshness::Changed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::store::MockRemoteStore;
    use bytes::Bytes;

    #[tokio::test]
    async fn absent_local_is_changed_without_touching_remote() {
        let store = MockRemoteStore::new();
        let detector = ChangeDetector::new(Arc::new(store));
        assert_eq!(
            detector.needs_update(None, "12345/audio.mp3").await,
            Freshness::Changed
        );
    }

    #[tokio::test]
    async fn matching_hash_is_unchanged_and_memoized() {
        let body = Bytes::from_static(b"audio-bytes");
        let local = sha256_hex(&body);

        let mut store = MockRemoteStore::new();
        store
            .expect_fetch()
            .times(1)
            .returning(move |_| Ok(Bytes::from_static(b"audio-bytes")));

        let detector = ChangeDetector::new(Arc::new(store));
        assert_eq!(
            detector.needs_update(Some(&local), "12345/audio.mp3").await,
            Freshness::Unchanged
        );
        // Second query within the pass hits the memo, not the store.
        assert_eq!(
            detector.needs_update(Some(&local), "12345/audio.mp3").await,
            Freshness::Unchanged
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_unknown() {
        let mut store = MockRemoteStore::new();
        store
            .expect_fetch()
            .returning(|_| Err(SyncError::Network("boom".into())));

        let detector = ChangeDetector::new(Arc::new(store));
        let freshness = detector
            .needs_update(Some("deadbeef"), "12345/manifest.json")
            .await;
        assert_eq!(freshness, Freshness::Unknown);
        assert!(freshness.requires_fetch());
    }
}
