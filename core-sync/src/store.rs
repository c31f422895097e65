//! # Remote Content Store
//!
//! Access to the HTTP server holding the canonical sound catalog: a root
//! directory listing with one numeric subdirectory per tag. The trait seam
//! keeps the engine testable against in-memory stores.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Abstraction over the remote content store. The production implementation
/// talks plain HTTP to a static file server; tests substitute an in-memory
/// store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the directory listing at the store root as raw HTML.
    async fn list_root(&self) -> Result<String>;

    /// Check whether a file exists at the given path relative to the root.
    async fn exists(&self, rel: &str) -> Result<bool>;

    /// Fetch the full body of a file relative to the root.
    async fn fetch(&self, rel: &str) -> Result<Bytes>;
}

/// HTTP-backed remote store. Expects the base URL to serve a directory
/// listing at its root, with per-tag subdirectories below it.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("soundbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, rel: &str) -> String {
        if rel.is_empty() {
            format!("{}/", self.base_url)
        } else {
            format!("{}/{}", self.base_url, rel)
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list_root(&self) -> Result<String> {
        let resp = self
            .client
            .get(self.url(""))
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        resp.text()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))
    }

    async fn exists(&self, rel: &str) -> Result<bool> {
        let resp = self
            .client
            .head(self.url(rel))
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(resp.status().is_success())
    }

    async fn fetch(&self, rel: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get(self.url(rel))
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        resp.bytes()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))
    }
}
