//! # Content Items
//!
//! A content item is one playable entry in the cache: a tag id, its display
//! manifest, the audio artifact, an optional precomputed waveform, and the
//! content fingerprints used for change detection.
//!
//! ## Cache layout
//!
//! ```text
//! <cache-root>/<tag-id>/manifest.json
//! <cache-root>/<tag-id>/audio.mp3
//! <cache-root>/<tag-id>/waveform.json   (optional)
//! ```
//!
//! A directory is valid only when both required files exist and the manifest
//! parses; anything else is treated as absent for lookup and deletion
//! purposes alike.

use crate::error::{LibraryError, Result};
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name of the per-item display metadata document.
pub const MANIFEST_FILE: &str = "manifest.json";
/// File name of the playable audio artifact.
pub const AUDIO_FILE: &str = "audio.mp3";
/// File name of the optional precomputed waveform.
pub const WAVEFORM_FILE: &str = "waveform.json";

/// Digits-only identifier scanned from a physical token.
///
/// Construction trims surrounding whitespace (scanner lines arrive
/// newline-terminated) and rejects anything that is not a non-empty string
/// of ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagId(String);

impl TagId {
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(LibraryError::InvalidTag(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TagId {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Content hashes used to decide whether a cached item is stale.
///
/// One hex-encoded SHA-256 digest per tracked file. This is the single
/// canonical fingerprint kind for the whole system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub manifest: String,
    pub audio: String,
}

/// Hex-encoded SHA-256 digest of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// One fully validated entry in the local cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub tag_id: TagId,
    pub manifest: Manifest,
    pub audio_path: PathBuf,
    pub waveform_path: Option<PathBuf>,
    pub fingerprint: Fingerprint,
}

impl ContentItem {
    /// Load and validate one item directory, computing fingerprints.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::MissingArtifact`] when either required file
    /// is absent and [`LibraryError::ManifestParse`] when the manifest does
    /// not parse. Callers treat both as "directory is invalid".
    pub async fn load(root: &Path, tag_id: TagId) -> Result<Self> {
        let dir = root.join(tag_id.as_str());
        let manifest_path = dir.join(MANIFEST_FILE);
        let audio_path = dir.join(AUDIO_FILE);

        let manifest_bytes = tokio::fs::read(&manifest_path).await.map_err(|_| {
            LibraryError::MissingArtifact {
                tag_id: tag_id.to_string(),
                file: MANIFEST_FILE,
            }
        })?;
        let audio_bytes =
            tokio::fs::read(&audio_path)
                .await
                .map_err(|_| LibraryError::MissingArtifact {
                    tag_id: tag_id.to_string(),
                    file: AUDIO_FILE,
                })?;

        let manifest = Manifest::from_slice(&manifest_bytes).map_err(|source| {
            LibraryError::ManifestParse {
                tag_id: tag_id.to_string(),
                source,
            }
        })?;

        let waveform_path = dir.join(WAVEFORM_FILE);
        let waveform_path = tokio::fs::try_exists(&waveform_path)
            .await
            .unwrap_or(false)
            .then_some(waveform_path);

        Ok(Self {
            tag_id,
            manifest,
            audio_path,
            waveform_path,
            fingerprint: Fingerprint {
                manifest: sha256_hex(&manifest_bytes),
                audio: sha256_hex(&audio_bytes),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_id_accepts_digits_and_trims() {
        let tag = TagId::new(" 0008479619\n").unwrap();
        assert_eq!(tag.as_str(), "0008479619");
    }

    #[test]
    fn tag_id_rejects_non_digits() {
        assert!(TagId::new("abc123").is_err());
        assert!(TagId::new("").is_err());
        assert!(TagId::new("  \n").is_err());
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
