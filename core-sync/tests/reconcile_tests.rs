//! End-to-end reconciliation tests against an in-memory remote store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use core_library::{LibraryIndex, TagId, AUDIO_FILE, MANIFEST_FILE};
use core_sync::{PassOutcome, RemoteStore, SyncConfig, SyncEngine, SyncError};

const MANIFEST_A: &str = r#"{"color": [10, 20, 30]}"#;
const MANIFEST_B: &str = r#"{"color": [200, 100, 50], "title": "B side"}"#;

/// In-memory remote store with failure injection.
#[derive(Default)]
struct TestStore {
    files: Mutex<HashMap<String, Bytes>>,
    fail_fetches: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    slow_listing: AtomicBool,
}

impl TestStore {
    fn with_tag(self, tag: &str, manifest: &str, audio: &[u8]) -> Self {
        {
            let mut files = self.files.lock().unwrap();
            files.insert(
                format!("{tag}/{MANIFEST_FILE}"),
                Bytes::copy_from_slice(manifest.as_bytes()),
            );
            files.insert(
                format!("{tag}/{AUDIO_FILE}"),
                Bytes::copy_from_slice(audio),
            );
        }
        self
    }

    fn set_file(&self, rel: &str, body: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(rel.to_string(), Bytes::copy_from_slice(body));
    }

    fn remove_tag(&self, tag: &str) {
        self.files
            .lock()
            .unwrap()
            .retain(|rel, _| !rel.starts_with(&format!("{tag}/")));
    }

    fn fail_fetch(&self, rel: &str) {
        self.fail_fetches.lock().unwrap().insert(rel.to_string());
    }
}

#[async_trait]
impl RemoteStore for TestStore {
    async fn list_root(&self) -> core_sync::Result<String> {
        if self.slow_listing.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        if self.fail_listing.load(Ordering::Relaxed) {
            return Err(SyncError::Network("connection refused".into()));
        }
        let files = self.files.lock().unwrap();
        let mut dirs: Vec<String> = files
            .keys()
            .filter_map(|rel| rel.split('/').next().map(str::to_string))
            .collect();
        dirs.sort();
        dirs.dedup();
        let body: String = dirs
            .iter()
            .map(|d| format!("<a href=\"{d}/\">{d}/</a>\n"))
            .collect();
        Ok(format!("<html><body>\n{body}</body></html>"))
    }

    async fn exists(&self, rel: &str) -> core_sync::Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(rel))
    }

    async fn fetch(&self, rel: &str) -> core_sync::Result<Bytes> {
        if self.fail_fetches.lock().unwrap().contains(rel) {
            return Err(SyncError::Network(format!("injected failure for {rel}")));
        }
        self.files
            .lock()
            .unwrap()
            .get(rel)
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("404 for {rel}")))
    }
}

fn engine_with(
    store: Arc<TestStore>,
    root: &std::path::Path,
) -> (SyncEngine, Arc<LibraryIndex>) {
    let library = Arc::new(LibraryIndex::new(root));
    let engine = SyncEngine::new(
        store,
        Arc::clone(&library),
        None,
        SyncConfig::default(),
    );
    (engine, library)
}

fn tag(s: &str) -> TagId {
    TagId::new(s).unwrap()
}

#[tokio::test]
async fn first_pass_downloads_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(
        TestStore::default()
            .with_tag("1001", MANIFEST_A, b"first")
            .with_tag("1002", MANIFEST_B, b"second"),
    );
    let (engine, library) = engine_with(store, tmp.path());

    let outcome = engine.reconcile(false).await.unwrap();
    let PassOutcome::Completed(stats) = outcome else {
        panic!("expected completed pass, got {outcome:?}");
    };
    assert_eq!(stats.added, 2);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.failed, 0);

    assert!(engine.has_completed_pass());
    assert_eq!(library.len().await, 2);
    let item = library.lookup(&tag("1002")).await.unwrap();
    assert_eq!(item.manifest.title.as_deref(), Some("B side"));
    assert_eq!(
        tokio::fs::read(&item.audio_path).await.unwrap(),
        b"second"
    );
}

#[tokio::test]
async fn unchanged_second_pass_downloads_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(TestStore::default().with_tag("1001", MANIFEST_A, b"pcm"));
    let (engine, _library) = engine_with(store, tmp.path());

    engine.reconcile(false).await.unwrap();
    let after_first = engine.downloads_performed();
    assert_eq!(after_first, 2);

    let outcome = engine.reconcile(false).await.unwrap();
    assert_eq!(engine.downloads_performed(), after_first);
    let PassOutcome::Completed(stats) = outcome else {
        panic!("expected completed pass");
    };
    assert_eq!(stats.added + stats.updated + stats.deleted, 0);
}

#[tokio::test]
async fn changed_remote_bytes_are_refetched() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(TestStore::default().with_tag("1001", MANIFEST_A, b"v1"));
    let (engine, library) = engine_with(Arc::clone(&store), tmp.path());

    engine.reconcile(false).await.unwrap();

    // Change remote audio content only. Detection is by content hash, so
    // this is picked up regardless of any timestamp metadata.
    store.set_file(&format!("1001/{AUDIO_FILE}"), b"v2 remaster");

    let PassOutcome::Completed(stats) = engine.reconcile(false).await.unwrap() else {
        panic!("expected completed pass");
    };
    assert_eq!(stats.updated, 1);

    let item = library.lookup(&tag("1001")).await.unwrap();
    assert_eq!(
        tokio::fs::read(&item.audio_path).await.unwrap(),
        b"v2 remaster"
    );
}

#[tokio::test]
async fn tag_removed_from_remote_is_deleted_locally() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(
        TestStore::default()
            .with_tag("1001", MANIFEST_A, b"keep")
            .with_tag("1002", MANIFEST_B, b"drop"),
    );
    let (engine, library) = engine_with(Arc::clone(&store), tmp.path());

    engine.reconcile(false).await.unwrap();
    assert_eq!(library.len().await, 2);

    store.remove_tag("1002");
    let PassOutcome::Completed(stats) = engine.reconcile(false).await.unwrap() else {
        panic!("expected completed pass");
    };
    assert_eq!(stats.deleted, 1);

    assert!(library.lookup(&tag("1002")).await.is_none());
    assert!(!tmp.path().join("1002").exists());
    assert!(tmp.path().join("1001").join(AUDIO_FILE).exists());
}

#[tokio::test]
async fn unreachable_remote_deletes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(TestStore::default().with_tag("1001", MANIFEST_A, b"pcm"));
    let (engine, library) = engine_with(Arc::clone(&store), tmp.path());

    engine.reconcile(false).await.unwrap();

    store.fail_listing.store(true, Ordering::Relaxed);
    let outcome = engine.reconcile(false).await.unwrap();
    assert_eq!(outcome, PassOutcome::RemoteUnavailable);

    // Previous local state survives the failed pass untouched.
    assert!(tmp.path().join("1001").join(AUDIO_FILE).exists());
    assert!(library.lookup(&tag("1001")).await.is_some());
}

#[tokio::test]
async fn empty_listing_is_treated_as_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(TestStore::default().with_tag("1001", MANIFEST_A, b"pcm"));
    let (engine, _library) = engine_with(Arc::clone(&store), tmp.path());

    engine.reconcile(false).await.unwrap();

    store.remove_tag("1001");
    let outcome = engine.reconcile(false).await.unwrap();
    assert_eq!(outcome, PassOutcome::RemoteUnavailable);
    assert!(tmp.path().join("1001").join(MANIFEST_FILE).exists());
}

#[tokio::test]
async fn one_failing_item_does_not_stop_the_pass() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(
        TestStore::default()
            .with_tag("1001", MANIFEST_A, b"good")
            .with_tag("1002", MANIFEST_B, b"bad"),
    );
    store.fail_fetch(&format!("1002/{AUDIO_FILE}"));
    let (engine, library) = engine_with(store, tmp.path());

    let PassOutcome::Completed(stats) = engine.reconcile(false).await.unwrap() else {
        panic!("expected completed pass");
    };
    assert_eq!(stats.added, 1);
    assert_eq!(stats.failed, 1);

    // The healthy item made it into the index; the broken one did not.
    assert!(library.lookup(&tag("1001")).await.is_some());
    assert!(library.lookup(&tag("1002")).await.is_none());
}

#[tokio::test]
async fn force_refetches_unchanged_items() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(TestStore::default().with_tag("1001", MANIFEST_A, b"pcm"));
    let (engine, _library) = engine_with(store, tmp.path());

    engine.reconcile(false).await.unwrap();
    let before = engine.downloads_performed();

    engine.reconcile(true).await.unwrap();
    assert_eq!(engine.downloads_performed(), before + 2);
}

#[tokio::test]
async fn fetch_item_pulls_a_single_tag() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(
        TestStore::default()
            .with_tag("1001", MANIFEST_A, b"one")
            .with_tag("1002", MANIFEST_B, b"two"),
    );
    let (engine, library) = engine_with(store, tmp.path());

    engine.fetch_item(&tag("1002")).await.unwrap();

    assert!(library.lookup(&tag("1002")).await.is_some());
    assert!(library.lookup(&tag("1001")).await.is_none());
    assert!(!engine.has_completed_pass());
}

#[tokio::test]
async fn fetch_item_for_unknown_tag_is_not_available() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(TestStore::default());
    let (engine, library) = engine_with(store, tmp.path());

    let err = engine.fetch_item(&tag("4040")).await.unwrap_err();
    assert!(matches!(err, SyncError::NotAvailable(_)));
    assert!(library.lookup(&tag("4040")).await.is_none());
}

#[tokio::test]
async fn stray_temp_files_are_swept_by_the_next_pass() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(TestStore::default().with_tag("1001", MANIFEST_A, b"pcm"));
    let (engine, library) = engine_with(store, tmp.path());

    // Leftovers of a download interrupted mid-write.
    let dir = tmp.path().join("1001");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let orphan = dir.join(format!("{AUDIO_FILE}.tmp"));
    tokio::fs::write(&orphan, b"partial").await.unwrap();

    engine.reconcile(false).await.unwrap();

    assert!(!orphan.exists());
    assert!(library.lookup(&tag("1001")).await.is_some());
}

#[tokio::test]
async fn concurrent_pass_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(TestStore::default().with_tag("1001", MANIFEST_A, b"pcm"));
    store.slow_listing.store(true, Ordering::Relaxed);
    let (engine, _library) = engine_with(store, tmp.path());
    let engine = Arc::new(engine);

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.reconcile(false).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = engine.reconcile(false).await.unwrap_err();
    assert!(matches!(err, SyncError::PassInFlight));

    first.await.unwrap().unwrap();
}
