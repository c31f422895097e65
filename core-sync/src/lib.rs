//! # Content Sync
//!
//! Reconciles the local sound cache against a remote HTTP content store.
//! A pass lists the remote catalog, deletes local items the remote no
//! longer offers, downloads new or changed artifacts through a bounded
//! pool, and rebuilds the library index. Change detection compares
//! SHA-256 content hashes, so a touched-but-identical file is never
//! refetched and a changed file with a stale timestamp always is.

pub mod catalog;
pub mod change;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod store;

pub use catalog::{parse_listing, RemoteCatalog};
pub use change::{ChangeDetector, Freshness};
pub use engine::{PassOutcome, PassStats, SyncConfig, SyncEngine};
pub use error::{Result, SyncError};
pub use fetch::{sweep_temp_files, Fetcher};
pub use store::{HttpRemoteStore, RemoteStore};
