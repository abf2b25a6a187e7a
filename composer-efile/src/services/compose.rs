//! Per-organization composite documents
//!
//! A composite is `{ein}.json` under the data root, mapping each filing
//! period to its canonical record. Updating a composite overwrites only the
//! periods that changed.

use super::retrieve::{JsonChanges, RetrieveEfiles};
use crate::codec::{CanonicalRecord, Entries, Node};
use crate::index::ChangeSet;
use crate::store::ObjectStore;
use crate::utils::{read_intermediate, run_on_cpu_pool};
use composer_common::{OrgPathManager, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const COMPOSITE_EXTENSION: &str = "json";

/// Fetch → convert → compose orchestrator
pub struct ComposeEfiles {
    retrieve: RetrieveEfiles,
    path_mgr: OrgPathManager,
    workers: usize,
}

impl ComposeEfiles {
    pub fn build(
        basepath: &Path,
        store: Arc<dyn ObjectStore>,
        temp_path: &Path,
        no_cleanup: bool,
        workers: usize,
        io_workers: usize,
    ) -> Result<Self> {
        let retrieve = RetrieveEfiles::new(store, temp_path, no_cleanup, workers, io_workers)?;
        Ok(Self {
            retrieve,
            path_mgr: OrgPathManager::new(basepath),
            workers: workers.max(1),
        })
    }

    /// Run all three stages over the staged changes; returns composites written
    pub async fn run(&self, changes: ChangeSet) -> Result<usize> {
        if changes.is_empty() {
            tracing::info!("No staged e-file changes; nothing to compose");
            return Ok(0);
        }

        let json_changes = self.retrieve.retrieve(&changes).await?;
        tracing::info!(organizations = json_changes.len(), "Updating e-file composites");
        self.process_all(json_changes).await
    }

    /// Merge converted records into composites on the CPU pool
    pub async fn process_all(&self, json_changes: JsonChanges) -> Result<usize> {
        let written = Arc::new(AtomicUsize::new(0));
        let counter = written.clone();
        let path_mgr = self.path_mgr.clone();

        run_on_cpu_pool("compose", json_changes, self.workers, move |chunk| {
            for (ein, updates) in chunk {
                if create_or_update(&path_mgr, &ein, &updates)? {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(())
        })
        .await?;

        let written = written.load(Ordering::Relaxed);
        tracing::info!(composites = written, "Composites written");
        Ok(written)
    }
}

fn read_existing(path_mgr: &OrgPathManager, ein: &str) -> Result<Entries> {
    match path_mgr.read(ein, COMPOSITE_EXTENSION)? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(IndexMap::new()),
    }
}

/// Apply one organization's updates. Returns false, writing nothing, when
/// none of its converted records exist.
pub fn create_or_update(
    path_mgr: &OrgPathManager,
    ein: &str,
    updates: &IndexMap<String, PathBuf>,
) -> Result<bool> {
    let mut records = Vec::with_capacity(updates.len());
    for (period, json_path) in updates {
        match read_intermediate(json_path) {
            Ok(bytes) => {
                let record: CanonicalRecord = serde_json::from_slice(&bytes)?;
                records.push((period.clone(), record));
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(
                    ein = %ein,
                    period = %period,
                    error = %e,
                    "Converted record missing, skipping period"
                );
            }
            Err(e) => return Err(e),
        }
    }

    if records.is_empty() {
        return Ok(false);
    }

    let mut composite = read_existing(path_mgr, ein)?;
    for (period, record) in records {
        composite.insert(period, Node::Object(record));
    }

    let pretty = serde_json::to_vec_pretty(&composite)?;
    let path = path_mgr.write(ein, COMPOSITE_EXTENSION, &pretty)?;
    tracing::debug!(ein = %ein, path = %path.display(), periods = composite.len(), "Composite written");
    Ok(true)
}
