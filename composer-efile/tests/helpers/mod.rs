//! Test helper utilities
//!
//! Shared fixtures for composer-efile integration tests

#![allow(dead_code)]

use composer_efile::models::{FilingDescriptor, ListedTime};
use composer_efile::UpdateSettings;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Descriptor for `ein`/`period` with the default record id
pub fn filing(id: &str, ein: &str, period: &str, submitted: &str, uploaded: &str) -> FilingDescriptor {
    FilingDescriptor {
        record_id: format!("{}_{}", ein, period),
        irs_efile_id: id.to_string(),
        irs_dln: format!("9349{}", id),
        ein: ein.to_string(),
        period: period.to_string(),
        name_org: format!("ORGANIZATION {}", ein),
        form_type: "990".to_string(),
        date_submitted: ListedTime::parse(submitted).unwrap(),
        date_uploaded: ListedTime::parse(uploaded).unwrap(),
        url: format!("https://s3.amazonaws.com/irs-form-990/{}_public.xml", id),
    }
}

/// Minimal IRS-style return carrying a recognizable marker
pub fn raw_return(ein: &str, period: &str, marker: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Return xmlns="http://www.irs.gov/efile" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://www.irs.gov/efile" returnVersion="2010v3.2">
  <ReturnHeader binaryAttachmentCount="0">
    <TaxPeriodEndDate>{period}</TaxPeriodEndDate>
    <Filer>
      <EIN>{ein}</EIN>
    </Filer>
  </ReturnHeader>
  <ReturnData documentCount="1">
    <IRS990>
      <Marker>{marker}</Marker>
    </IRS990>
  </ReturnData>
</Return>
"#
    )
}

/// Write `{id}_public.xml` into a file-backed source directory
pub fn put_raw(source: &Path, id: &str, body: &str) {
    std::fs::write(source.join(format!("{}_public.xml", id)), body).unwrap();
}

/// Write `index_{year}.json` listing the given filings
pub fn put_listing(source: &Path, year: i32, filings: &[FilingDescriptor]) {
    let entries: Vec<_> = filings
        .iter()
        .map(|f| {
            json!({
                "EIN": f.ein,
                "TaxPeriod": f.period,
                "DLN": f.irs_dln,
                "FormType": f.form_type,
                "URL": f.url,
                "OrganizationName": f.name_org,
                "SubmittedOn": f.date_submitted.as_str(),
                "ObjectId": f.irs_efile_id,
                "LastUpdated": f.date_uploaded.as_str(),
            })
        })
        .collect();
    let listing = json!({ format!("Filings{}", year): entries });
    std::fs::write(
        source.join(format!("index_{}.json", year)),
        serde_json::to_vec(&listing).unwrap(),
    )
    .unwrap();
}

/// Composite path for an organization under a data root
pub fn composite_path(data_root: &Path, ein: &str) -> PathBuf {
    data_root
        .join(&ein[0..3])
        .join(&ein[3..6])
        .join(format!("{}.json", ein))
}

pub fn read_composite(data_root: &Path, ein: &str) -> serde_json::Value {
    let bytes = std::fs::read(composite_path(data_root, ein)).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn settings(data_root: &Path, temp_root: &Path, source: &Path, year: i32) -> UpdateSettings {
    UpdateSettings {
        data_root: data_root.to_path_buf(),
        temp_root: temp_root.to_path_buf(),
        no_cleanup: false,
        source: source.to_string_lossy().to_string(),
        first_year: year,
        last_year: year,
        workers: 2,
        io_workers: 2,
        max_lock_wait_ms: 1000,
    }
}

/// Number of entries directly inside a directory (0 if missing)
pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
}
