//! Listing ingestion: yearly e-file listings into the metadata index

use crate::index::EfileMetadataIndex;
use crate::models::{listing_key, parse_listing};
use crate::store::ObjectStore;
use composer_common::Result;
use std::sync::Arc;

/// Counts from one ingestion pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub years_read: usize,
    pub years_missing: usize,
    pub entries_seen: usize,
    pub entries_skipped: usize,
}

pub struct EfileIndices {
    store: Arc<dyn ObjectStore>,
    first_year: i32,
    last_year: i32,
}

impl EfileIndices {
    pub fn new(store: Arc<dyn ObjectStore>, first_year: i32, last_year: i32) -> Self {
        Self {
            store,
            first_year,
            last_year,
        }
    }

    /// Stage every listed filing for `first_year..=last_year`
    ///
    /// Years without a listing and entries that don't describe a usable
    /// filing are logged and skipped.
    pub async fn ingest(&self, index: &mut EfileMetadataIndex) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();

        for year in self.first_year..=self.last_year {
            let key = listing_key(year);
            if !self.store.exists(&key).await? {
                tracing::info!(year, key = %key, "No listing for year, skipping");
                summary.years_missing += 1;
                continue;
            }

            let body = self.store.get(&key).await?;
            let entries = parse_listing(&body)?;
            tracing::info!(year, entries = entries.len(), "Ingesting e-file listing");
            summary.years_read += 1;

            for entry in entries {
                summary.entries_seen += 1;
                let object_id = entry.object_id.clone();
                match entry.into_descriptor() {
                    Ok(filing) => index.add(filing).await?,
                    Err(e) => {
                        tracing::warn!(year, object_id = %object_id, error = %e, "Skipping listing entry");
                        summary.entries_skipped += 1;
                    }
                }
            }
        }

        tracing::info!(
            years_read = summary.years_read,
            entries = summary.entries_seen,
            skipped = summary.entries_skipped,
            staged = index.staged_change_count(),
            superseded = index.staged_superseded_count(),
            "Listing ingestion complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::store::FileBackedStore;
    use tempfile::TempDir;

    const LISTING: &str = r#"{"Filings2011": [
        {"EIN": "208419458", "TaxPeriod": "201012", "DLN": "1", "FormType": "990",
         "URL": "", "OrganizationName": "A", "SubmittedOn": "2011-03-16",
         "ObjectId": "201103169349300325", "LastUpdated": "2016-03-21T17:23:53"},
        {"EIN": "20841", "TaxPeriod": "201012", "DLN": "2", "FormType": "990",
         "URL": "", "OrganizationName": "B", "SubmittedOn": "2011-03-16",
         "ObjectId": "201103169349300326", "LastUpdated": "2016-03-21T17:23:53"},
        {"EIN": "943041314", "TaxPeriod": "201012", "DLN": "3", "FormType": "990",
         "URL": "", "OrganizationName": "C", "SubmittedOn": "sometime",
         "ObjectId": "201103169349300327", "LastUpdated": "2016-03-21T17:23:53"}
    ]}"#;

    #[tokio::test]
    async fn test_ingest_skips_bad_entries_and_missing_years() {
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("index_2011.json"), LISTING).unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FileBackedStore::new(source.path()));
        let mut index = EfileMetadataIndex::build(init_memory_pool().await.unwrap())
            .await
            .unwrap();

        let summary = EfileIndices::new(store, 2010, 2011)
            .ingest(&mut index)
            .await
            .unwrap();

        assert_eq!(
            summary,
            IngestSummary {
                years_read: 1,
                years_missing: 1,
                entries_seen: 3,
                entries_skipped: 2,
            }
        );
        let staged: Vec<_> = index.changes().map(|(ein, _)| ein.clone()).collect();
        assert_eq!(staged, vec!["208419458".to_string()]);
    }
}
