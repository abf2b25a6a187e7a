//! Object store over a local directory tree

use super::{ObjectStore, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Keys map to files relative to `root`
#[derive(Debug, Clone)]
pub struct FileBackedStore {
    root: PathBuf,
}

impl FileBackedStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StoreError::AccessDenied {
                key: key.to_string(),
                reason: "key escapes the store root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn map_io_error(key: &str, err: std::io::Error) -> StoreError {
    match err.kind() {
        ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
        ErrorKind::PermissionDenied => StoreError::AccessDenied {
            key: key.to_string(),
            reason: err.to_string(),
        },
        _ => StoreError::Transport {
            key: key.to_string(),
            reason: err.to_string(),
        },
    }
}

#[async_trait]
impl ObjectStore for FileBackedStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| map_io_error(key, e))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io_error(key, e)),
        }
    }
}
