//! One full update: ingest listings, compose changed filings, commit the index

use super::compose::ComposeEfiles;
use super::indices::{EfileIndices, IngestSummary};
use crate::db::{self, STATE_DB_FILE};
use crate::index::EfileMetadataIndex;
use crate::store::{open_store, ObjectStore};
use composer_common::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Resolved settings for an update run
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    /// Holds `state.sqlite` and the composite tree; must exist
    pub data_root: PathBuf,
    /// Parent of the private scratch directories
    pub temp_root: PathBuf,
    pub no_cleanup: bool,
    /// Object-store URL or local directory
    pub source: String,
    pub first_year: i32,
    pub last_year: i32,
    pub workers: usize,
    pub io_workers: usize,
    pub max_lock_wait_ms: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    pub ingest: IngestSummary,
    pub changes: usize,
    pub superseded: usize,
    pub composites: usize,
}

pub struct UpdateEfileState {
    settings: UpdateSettings,
    store: Arc<dyn ObjectStore>,
}

impl UpdateEfileState {
    pub fn new(settings: UpdateSettings) -> Result<Self> {
        let store = open_store(&settings.source, settings.workers * settings.io_workers)?;
        Self::with_store(settings, store)
    }

    pub fn with_store(settings: UpdateSettings, store: Arc<dyn ObjectStore>) -> Result<Self> {
        if !settings.data_root.is_dir() {
            return Err(Error::Config(format!(
                "Data path does not exist or is not a directory: {}",
                settings.data_root.display()
            )));
        }
        if settings.first_year > settings.last_year {
            return Err(Error::Config(format!(
                "First year {} is after last year {}",
                settings.first_year, settings.last_year
            )));
        }
        Ok(Self { settings, store })
    }

    /// Run the update. A pipeline failure returns before the commit, leaving
    /// the index as it was so the next run re-stages the same filings.
    pub async fn run(&self) -> Result<UpdateSummary> {
        let settings = &self.settings;
        tracing::info!(
            data_root = %settings.data_root.display(),
            source = %self.store.describe(),
            first_year = settings.first_year,
            last_year = settings.last_year,
            "Updating e-file state"
        );

        let pool = db::init_database_pool(&settings.data_root.join(STATE_DB_FILE)).await?;
        let mut index = EfileMetadataIndex::build(pool.clone())
            .await?
            .with_max_lock_wait(settings.max_lock_wait_ms);

        let ingest = EfileIndices::new(self.store.clone(), settings.first_year, settings.last_year)
            .ingest(&mut index)
            .await?;

        let mut summary = UpdateSummary {
            ingest,
            changes: index.staged_change_count(),
            superseded: index.staged_superseded_count(),
            composites: 0,
        };

        let composed = self.compose(&index).await;
        summary.composites = match composed {
            Ok(composites) => composites,
            Err(e) => {
                tracing::error!(error = %e, "Composition failed; index left uncommitted");
                pool.close().await;
                return Err(e);
            }
        };

        index.commit().await?;
        pool.close().await;

        tracing::info!(
            changes = summary.changes,
            superseded = summary.superseded,
            composites = summary.composites,
            "E-file state updated"
        );
        Ok(summary)
    }

    async fn compose(&self, index: &EfileMetadataIndex) -> Result<usize> {
        let settings = &self.settings;
        // Scratch directories live exactly as long as the composer
        let composer = ComposeEfiles::build(
            &settings.data_root,
            self.store.clone(),
            &settings.temp_root,
            settings.no_cleanup,
            settings.workers,
            settings.io_workers,
        )?;
        composer.run(index.change_set()).await
    }
}
