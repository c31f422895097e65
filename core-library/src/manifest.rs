//! # Content Manifest
//!
//! Each cached item carries a small JSON metadata document describing how the
//! companion display process should render it: a required RGB color and an
//! optional human-readable title.
//!
//! Color components arriving from the content store are clamped to the
//! 0..=255 range rather than rejected, so a sloppy manifest still renders
//! with a usable color.

use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Display color as red/green/blue components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: [i64; 3] = Deserialize::deserialize(deserializer)?;
        Ok(Rgb(clamp(raw[0]), clamp(raw[1]), clamp(raw[2])))
    }
}

fn clamp(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

/// Per-item display metadata stored as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Display color for the visualizer.
    pub color: Rgb,

    /// Optional display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Manifest {
    /// Parse a manifest document from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`LibraryError::ManifestParse`](crate::LibraryError) with
    /// the owning tag id attached by callers that know it.
    pub fn from_slice(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Read and parse a manifest file from disk.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_slice(&bytes).map_err(|source| crate::LibraryError::ManifestParse {
            tag_id: path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source,
        })
    }
}
