//! Fetch and convert stages
//!
//! Raw documents for every staged filing are downloaded into one private
//! scratch root and converted into canonical JSON records in another. Both
//! roots are sharded by organization key and removed on drop unless
//! `no_cleanup` is set.

use crate::codec;
use crate::index::ChangeSet;
use crate::store::ObjectStore;
use crate::utils::{create_scratch_dir, read_intermediate, run_on_cpu_pool, run_on_task_pool};
use composer_common::paths::{ensure_shard_dir, shard_dir};
use composer_common::Result;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// period -> converted record path, per organization
pub type JsonChanges = Vec<(String, IndexMap<String, PathBuf>)>;

/// Shard directory and object key of one raw document to fetch
#[derive(Debug, Clone)]
struct FetchTarget {
    dir: PathBuf,
    key: String,
}

#[derive(Debug, Default)]
struct StageCounters {
    done: AtomicUsize,
    skipped: AtomicUsize,
}

pub struct RetrieveEfiles {
    store: Arc<dyn ObjectStore>,
    xml_cache_dir: PathBuf,
    json_cache_dir: PathBuf,
    no_cleanup: bool,
    workers: usize,
    io_workers: usize,
}

impl RetrieveEfiles {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        temp_root: &Path,
        no_cleanup: bool,
        workers: usize,
        io_workers: usize,
    ) -> Result<Self> {
        let xml_cache_dir = create_scratch_dir(temp_root)?;
        let json_cache_dir = create_scratch_dir(temp_root)?;
        tracing::debug!(
            xml = %xml_cache_dir.display(),
            json = %json_cache_dir.display(),
            "Scratch directories ready"
        );

        Ok(Self {
            store,
            xml_cache_dir,
            json_cache_dir,
            no_cleanup,
            workers: workers.max(1),
            io_workers: io_workers.max(1),
        })
    }

    pub fn xml_cache_dir(&self) -> &Path {
        &self.xml_cache_dir
    }

    pub fn json_cache_dir(&self) -> &Path {
        &self.json_cache_dir
    }

    /// Fetch, convert, and report where each converted record landed
    pub async fn retrieve(&self, changes: &ChangeSet) -> Result<JsonChanges> {
        self.fetch_all(changes).await?;
        self.convert_all(changes).await?;
        self.json_paths(changes)
    }

    /// Download every raw document into the XML scratch root.
    ///
    /// Chunks run as concurrent tasks; each chunk keeps up to `io_workers`
    /// requests in flight. Objects that cannot be retrieved are logged and skipped.
    pub async fn fetch_all(&self, changes: &ChangeSet) -> Result<()> {
        let mut targets = Vec::new();
        for (ein, periods) in changes {
            let dir = ensure_shard_dir(&self.xml_cache_dir, ein)?;
            targets.extend(periods.values().map(|filing| FetchTarget {
                dir: dir.clone(),
                key: filing.object_key(),
            }));
        }

        tracing::info!(
            documents = targets.len(),
            source = %self.store.describe(),
            "Downloading new raw e-files"
        );

        let counters = Arc::new(StageCounters::default());
        let store = self.store.clone();
        let io_workers = self.io_workers;
        let chunk_counters = counters.clone();
        run_on_task_pool("fetch", targets, self.workers, move |chunk| {
            fetch_chunk(store.clone(), chunk, io_workers, chunk_counters.clone())
        })
        .await?;

        tracing::info!(
            fetched = counters.done.load(Ordering::Relaxed),
            skipped = counters.skipped.load(Ordering::Relaxed),
            "Download complete"
        );
        Ok(())
    }

    /// Convert every fetched raw document into a canonical JSON record.
    ///
    /// Missing raw files and unconvertible documents are logged and skipped.
    pub async fn convert_all(&self, changes: &ChangeSet) -> Result<()> {
        tracing::info!("Converting raw e-files to canonical records");

        let counters = Arc::new(StageCounters::default());
        let xml_root = self.xml_cache_dir.clone();
        let json_root = self.json_cache_dir.clone();
        let chunk_counters = counters.clone();
        run_on_cpu_pool("convert", changes.clone(), self.workers, move |chunk| {
            convert_chunk(&xml_root, &json_root, chunk, &chunk_counters)
        })
        .await?;

        tracing::info!(
            converted = counters.done.load(Ordering::Relaxed),
            skipped = counters.skipped.load(Ordering::Relaxed),
            "Conversion complete"
        );
        Ok(())
    }

    /// Expected converted record path for every staged filing
    pub fn json_paths(&self, changes: &ChangeSet) -> Result<JsonChanges> {
        changes
            .iter()
            .map(|(ein, periods)| {
                let dir = shard_dir(&self.json_cache_dir, ein)?;
                let paths = periods
                    .iter()
                    .map(|(period, filing)| {
                        (period.clone(), dir.join(format!("{}.json", filing.irs_efile_id)))
                    })
                    .collect();
                Ok((ein.clone(), paths))
            })
            .collect()
    }
}

impl Drop for RetrieveEfiles {
    fn drop(&mut self) {
        if self.no_cleanup {
            tracing::info!(
                xml = %self.xml_cache_dir.display(),
                json = %self.json_cache_dir.display(),
                "Keeping scratch directories"
            );
            return;
        }

        for dir in [&self.xml_cache_dir, &self.json_cache_dir] {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

async fn fetch_chunk(
    store: Arc<dyn ObjectStore>,
    targets: Vec<FetchTarget>,
    io_workers: usize,
    counters: Arc<StageCounters>,
) -> Result<()> {
    let outcomes: Vec<Result<()>> = stream::iter(targets)
        .map(|target| {
            let store = store.clone();
            let counters = counters.clone();
            async move { fetch_one(store.as_ref(), target, &counters).await }
        })
        .buffer_unordered(io_workers)
        .collect()
        .await;

    outcomes.into_iter().collect()
}

async fn fetch_one(
    store: &dyn ObjectStore,
    target: FetchTarget,
    counters: &StageCounters,
) -> Result<()> {
    let key = target.key;

    let body = match store.get(&key).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Can't get object, skipping");
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
    };

    tokio::fs::write(target.dir.join(&key), body).await?;
    counters.done.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

fn convert_chunk(
    xml_root: &Path,
    json_root: &Path,
    chunk: ChangeSet,
    counters: &StageCounters,
) -> Result<()> {
    for (ein, periods) in chunk {
        let xml_dir = shard_dir(xml_root, &ein)?;
        let json_dir = ensure_shard_dir(json_root, &ein)?;

        for filing in periods.values() {
            let xml_path = xml_dir.join(filing.object_key());
            let raw = match read_intermediate(&xml_path) {
                Ok(raw) => raw,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "Raw e-file missing, skipping");
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let json = match codec::convert_to_json(&raw) {
                Ok(json) => json,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        ein = %ein,
                        irs_efile_id = %filing.irs_efile_id,
                        error = %e,
                        "Unconvertible e-file, skipping"
                    );
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(e) => return Err(e),
            };

            std::fs::write(json_dir.join(format!("{}.json", filing.irs_efile_id)), json)?;
            counters.done.fetch_add(1, Ordering::Relaxed);
        }
    }
    Ok(())
}
