//! # Local Content Library
//!
//! The on-disk cache of playable content items and its in-memory index.
//!
//! ## Overview
//!
//! This crate owns the data model for cached content:
//! - **Manifest** (`manifest`): per-item display metadata (`color`, `title`)
//! - **ContentItem / TagId** (`item`): validated cache entries with
//!   content-hash fingerprints
//! - **LibraryIndex** (`index`): tag id → item mapping rebuilt wholesale
//!   from disk, swapped atomically so readers never see partial state
//!
//! The sync engine writes the cache; everything else reads it through
//! [`LibraryIndex`].

pub mod error;
pub mod index;
pub mod item;
pub mod manifest;

pub use error::{LibraryError, Result};
pub use index::{scan_cache_root, LibraryIndex};
pub use item::{
    sha256_hex, ContentItem, Fingerprint, TagId, AUDIO_FILE, MANIFEST_FILE, WAVEFORM_FILE,
};
pub use manifest::{Manifest, Rgb};
