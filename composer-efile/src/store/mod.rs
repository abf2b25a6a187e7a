//! Remote object storage
//!
//! The pipeline reads raw e-file documents and yearly listings through the
//! [`ObjectStore`] trait. Two backends exist: a local directory tree
//! ([`FileBackedStore`]) and an HTTP bucket endpoint ([`HttpObjectStore`]).

pub mod file_backed;
pub mod http;

pub use file_backed::FileBackedStore;
pub use http::HttpObjectStore;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Per-object retrieval failures; callers log and skip the object
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied for {key}: {reason}")]
    AccessDenied { key: String, reason: String },

    #[error("Transport error for {key}: {reason}")]
    Transport { key: String, reason: String },
}

impl From<StoreError> for composer_common::Error {
    fn from(err: StoreError) -> Self {
        composer_common::Error::Storage(err.to_string())
    }
}

/// Read-only access to keyed blobs; shared across workers
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location, for logging
    fn describe(&self) -> String;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Pick a backend for `source`: `http(s)://` URLs use HTTP, anything else is
/// a local directory that must already exist.
pub fn open_store(source: &str, workers: usize) -> composer_common::Result<Arc<dyn ObjectStore>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return Ok(Arc::new(HttpObjectStore::new(source, workers)?));
    }

    let root = Path::new(source);
    if !root.is_dir() {
        return Err(composer_common::Error::Config(format!(
            "Source is neither an http(s) URL nor an existing directory: {}",
            source
        )));
    }
    Ok(Arc::new(FileBackedStore::new(root)))
}
