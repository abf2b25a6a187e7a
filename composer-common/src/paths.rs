//! Organization-key path layout
//!
//! Every per-organization artifact lives two directory levels below its root,
//! sharded by the first and second three-character slices of the key:
//! `{root}/208/419/208419458.json`. This bounds directory fan-out for
//! millions of organizations and guarantees that concurrent writers for
//! different keys never share a file.

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Shard directory for an organization key, relative to `root`. Does not touch the filesystem.
pub fn shard_dir(root: &Path, ein: &str) -> Result<PathBuf> {
    let first = ein.get(0..3);
    let second = ein.get(3..6);
    match (first, second) {
        (Some(first), Some(second)) => Ok(root.join(first).join(second)),
        _ => Err(Error::InvalidInput(format!(
            "Organization key too short for sharding: '{}'",
            ein
        ))),
    }
}

/// Shard directory for an organization key, created if missing
pub fn ensure_shard_dir(root: &Path, ein: &str) -> Result<PathBuf> {
    let dir = shard_dir(root, ein)?;
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Reads and writes per-organization artifacts under a base directory
#[derive(Debug, Clone)]
pub struct OrgPathManager {
    basepath: PathBuf,
}

impl OrgPathManager {
    pub fn new(basepath: impl Into<PathBuf>) -> Self {
        Self {
            basepath: basepath.into(),
        }
    }

    /// Path of `{ein}.{extension}` inside the organization's shard directory
    pub fn artifact_path(&self, ein: &str, extension: &str) -> Result<PathBuf> {
        Ok(shard_dir(&self.basepath, ein)?.join(format!("{}.{}", ein, extension)))
    }

    /// Read the artifact if it exists
    pub fn read(&self, ein: &str, extension: &str) -> Result<Option<Vec<u8>>> {
        let path = self.artifact_path(ein, extension)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the artifact wholesale
    ///
    /// Content goes to a sibling temp file first and is renamed into place, so a
    /// reader never observes a half-written artifact.
    pub fn write(&self, ein: &str, extension: &str, contents: &[u8]) -> Result<PathBuf> {
        let dir = ensure_shard_dir(&self.basepath, ein)?;
        let path = dir.join(format!("{}.{}", ein, extension));
        let tmp_path = dir.join(format!(".{}.{}.tmp", ein, extension));
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shard_dir_uses_two_three_char_slices() {
        let dir = shard_dir(Path::new("/data"), "208419458").unwrap();
        assert_eq!(dir, PathBuf::from("/data/208/419"));
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(shard_dir(Path::new("/data"), "12345").is_err());
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let temp = TempDir::new().unwrap();
        let mgr = OrgPathManager::new(temp.path());

        assert!(mgr.read("943041314", "json").unwrap().is_none());

        let written = mgr.write("943041314", "json", b"{}").unwrap();
        assert_eq!(written, temp.path().join("943/041/943041314.json"));
        assert_eq!(mgr.read("943041314", "json").unwrap().unwrap(), b"{}");

        mgr.write("943041314", "json", b"{\"a\": 1}").unwrap();
        assert_eq!(mgr.read("943041314", "json").unwrap().unwrap(), b"{\"a\": 1}");
    }
}
