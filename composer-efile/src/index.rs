//! E-file metadata index
//!
//! Tracks the latest filing for every (organization, period) slot plus every
//! filing that has been displaced. New filings are staged in memory by
//! [`EfileMetadataIndex::add`] and written in one transaction by
//! [`EfileMetadataIndex::commit`].

use crate::db::{self, filings, IndexTable};
use crate::models::FilingDescriptor;
use crate::utils::{commit_with_lock_retry, CommitFailure, CommitStep, StagedCounts};
use composer_common::config::DEFAULT_MAX_LOCK_WAIT_MS;
use composer_common::{Error, Result};
use indexmap::IndexMap;
use sqlx::{SqliteConnection, SqlitePool};

/// period -> descriptor
pub type PeriodChanges = IndexMap<String, FilingDescriptor>;

/// Materialized staged changes: (organization, period -> descriptor)
pub type ChangeSet = Vec<(String, PeriodChanges)>;

pub struct EfileMetadataIndex {
    pool: SqlitePool,
    /// organization -> period -> slot occupant
    staged_changes: IndexMap<String, PeriodChanges>,
    /// filing id -> displaced descriptor
    staged_superseded: IndexMap<String, FilingDescriptor>,
    max_lock_wait_ms: u64,
}

impl EfileMetadataIndex {
    /// Attach to an index database, creating the tables if needed
    pub async fn build(pool: SqlitePool) -> Result<Self> {
        tracing::info!("Initializing e-file metadata index");
        db::init_tables(&pool).await?;
        Ok(Self {
            pool,
            staged_changes: IndexMap::new(),
            staged_superseded: IndexMap::new(),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        })
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    /// Distinct organizations with a committed filing
    pub async fn organizations(&self) -> Result<Vec<String>> {
        filings::distinct_eins(&self.pool, IndexTable::Latest).await
    }

    /// Staged new/updated filings, grouped by organization
    pub fn changes(&self) -> impl Iterator<Item = (&String, &PeriodChanges)> {
        self.staged_changes.iter()
    }

    /// Owned snapshot of [`changes`](Self::changes) for the pipeline
    pub fn change_set(&self) -> ChangeSet {
        self.staged_changes
            .iter()
            .map(|(ein, periods)| (ein.clone(), periods.clone()))
            .collect()
    }

    pub fn staged_superseded(&self) -> impl Iterator<Item = &FilingDescriptor> {
        self.staged_superseded.values()
    }

    pub fn staged_change_count(&self) -> usize {
        self.staged_changes.values().map(|periods| periods.len()).sum()
    }

    pub fn staged_superseded_count(&self) -> usize {
        self.staged_superseded.len()
    }

    /// Committed latest filings for one organization
    pub async fn filings_for(&self, ein: &str) -> Result<Vec<FilingDescriptor>> {
        filings::filings_for_ein(&self.pool, IndexTable::Latest, ein).await
    }

    fn staged_occupant(&self, filing: &FilingDescriptor) -> Option<&FilingDescriptor> {
        self.staged_changes
            .get(&filing.ein)
            .and_then(|periods| periods.get(&filing.period))
    }

    /// Whether this filing has already been seen, staged or committed
    pub async fn known(&self, filing: &FilingDescriptor) -> Result<bool> {
        if self.staged_superseded.contains_key(&filing.irs_efile_id) {
            return Ok(true);
        }

        if self.staged_occupant(filing) == Some(filing) {
            return Ok(true);
        }

        for table in [IndexTable::Latest, IndexTable::Superseded] {
            let rows =
                filings::filings_by_irs_efile_id(&self.pool, table, &filing.irs_efile_id).await?;
            if !rows.is_empty() {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Stage a filing. Known filings are ignored; otherwise the filing either
    /// takes its slot or is staged as superseded. Nothing is written until
    /// [`commit`](Self::commit).
    pub async fn add(&mut self, filing: FilingDescriptor) -> Result<()> {
        if self.known(&filing).await? {
            return Ok(());
        }

        if let Some(occupant) = self.staged_occupant(&filing).cloned() {
            self.choose_filing_to_keep(filing, occupant);
            return Ok(());
        }

        let mut existing =
            filings::filings_by_record_id(&self.pool, IndexTable::Latest, &filing.record_id)
                .await?;
        if existing.len() > 1 {
            return Err(Error::Internal(format!(
                "{} committed latest filings share record id {}",
                existing.len(),
                filing.record_id
            )));
        }

        match existing.pop() {
            Some(other) => self.choose_filing_to_keep(filing, other),
            None => self.stage_change(filing),
        }
        Ok(())
    }

    /// Ranks two filings competing for the same slot; the loser is superseded.
    ///
    /// The later submission wins; equal submissions go to the later upload;
    /// a full tie goes to the incoming filing.
    fn choose_filing_to_keep(&mut self, filing: FilingDescriptor, other: FilingDescriptor) {
        if other.irs_efile_id == filing.irs_efile_id {
            // Same filing re-described: refresh the occupant, nothing is displaced
            self.stage_change(filing);
            return;
        }

        let submitted = filing.date_submitted.value();
        let other_submitted = other.date_submitted.value();
        let filing_loses = other_submitted > submitted
            || (other_submitted == submitted
                && other.date_uploaded.value() > filing.date_uploaded.value());

        if filing_loses {
            tracing::debug!(
                ein = %filing.ein,
                period = %filing.period,
                superseded = %filing.irs_efile_id,
                kept = %other.irs_efile_id,
                "Incoming filing superseded"
            );
            self.staged_superseded
                .insert(filing.irs_efile_id.clone(), filing);
        } else {
            tracing::debug!(
                ein = %filing.ein,
                period = %filing.period,
                superseded = %other.irs_efile_id,
                kept = %filing.irs_efile_id,
                "Existing filing superseded"
            );
            self.staged_superseded.insert(other.irs_efile_id.clone(), other);
            self.stage_change(filing);
        }
    }

    fn stage_change(&mut self, filing: FilingDescriptor) {
        self.staged_changes
            .entry(filing.ein.clone())
            .or_default()
            .insert(filing.period.clone(), filing);
    }

    /// Durably apply all staged state in one transaction, then clear staging.
    ///
    /// On failure the transaction is rolled back and staging is kept intact.
    pub async fn commit(&mut self) -> Result<()> {
        let staged = StagedCounts {
            changes: self.staged_change_count(),
            superseded: self.staged_superseded.len(),
        };
        tracing::info!(
            changes = staged.changes,
            superseded = staged.superseded,
            "Committing observed changes to persistent e-file metadata index"
        );

        let pool = &self.pool;
        let superseded = &self.staged_superseded;
        let changes = &self.staged_changes;
        commit_with_lock_retry(staged, self.max_lock_wait_ms, || {
            write_staged(pool, superseded, changes)
        })
        .await?;

        self.staged_superseded.clear();
        self.staged_changes.clear();
        Ok(())
    }
}

/// One commit attempt: a write-locked transaction over all staged rows
async fn write_staged(
    pool: &SqlitePool,
    superseded: &IndexMap<String, FilingDescriptor>,
    changes: &IndexMap<String, PeriodChanges>,
) -> std::result::Result<(), CommitFailure> {
    let mut conn = pool.acquire().await.map_err(CommitFailure::at(CommitStep::Begin))?;
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .map_err(CommitFailure::at(CommitStep::Begin))?;

    let finished = match write_rows(&mut conn, superseded, changes).await {
        Ok(()) => sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map(|_| ())
            .map_err(CommitFailure::at(CommitStep::Commit)),
        Err(e) => Err(CommitFailure::new(CommitStep::Write, e)),
    };

    if finished.is_err() {
        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            tracing::debug!(error = %e, "Rollback after failed commit attempt");
        }
    }
    finished
}

async fn write_rows(
    conn: &mut SqliteConnection,
    superseded: &IndexMap<String, FilingDescriptor>,
    changes: &IndexMap<String, PeriodChanges>,
) -> Result<()> {
    for filing in superseded.values() {
        filings::delete_if_exists(&mut *conn, IndexTable::Latest, &filing.irs_efile_id).await?;
        filings::upsert(&mut *conn, IndexTable::Superseded, filing).await?;
    }

    for filing in changes.values().flat_map(|periods| periods.values()) {
        filings::upsert(&mut *conn, IndexTable::Latest, filing).await?;
    }
    Ok(())
}
