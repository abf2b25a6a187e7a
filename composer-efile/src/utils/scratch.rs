//! Private scratch directories

use composer_common::{Error, Result};
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};

const NAME_LEN: usize = 10;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Create a fresh directory with a random 10-letter name under `base`
///
/// Names that already exist are skipped, so two scratch roots created from
/// the same base never collide.
pub fn create_scratch_dir(base: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(base)?;
    let mut rng = rand::thread_rng();

    loop {
        let name: String = (0..NAME_LEN)
            .filter_map(|_| LETTERS.choose(&mut rng).copied())
            .map(char::from)
            .collect();
        let dir = base.join(name);

        match std::fs::create_dir(&dir) {
            Ok(()) => {
                tracing::debug!(path = %dir.display(), "Created scratch directory");
                return Ok(dir);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read a file produced by an earlier pipeline stage
pub fn read_intermediate(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::MissingIntermediateFile(path.to_path_buf()),
        _ => e.into(),
    })
}
