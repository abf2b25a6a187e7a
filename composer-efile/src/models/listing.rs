//! Yearly e-file listing (`index_{year}.json`)
//!
//! A listing is a JSON object whose values are arrays of entries, e.g.
//! `{"Filings2011": [{"EIN": "208419458", "ObjectId": "...", ...}]}`.

use super::filing::{FilingDescriptor, ListedTime};
use composer_common::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;

/// Object key of the listing for one year
pub fn listing_key(year: i32) -> String {
    format!("index_{}.json", year)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ListingEntry {
    #[serde(rename = "EIN")]
    pub ein: String,
    pub tax_period: String,
    #[serde(rename = "DLN", default)]
    pub dln: String,
    #[serde(default)]
    pub form_type: String,
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(default)]
    pub organization_name: String,
    pub submitted_on: String,
    pub object_id: String,
    pub last_updated: String,
    /// Present only in listings that correlate amendments explicitly
    #[serde(default)]
    pub record_id: Option<String>,
}

impl ListingEntry {
    /// Build a descriptor; record id defaults to `"{EIN}_{TaxPeriod}"`
    pub fn into_descriptor(self) -> Result<FilingDescriptor> {
        if self.ein.len() < 6 || !self.ein.is_ascii() {
            return Err(Error::InvalidInput(format!(
                "Filing {} has unusable organization key '{}'",
                self.object_id, self.ein
            )));
        }

        let date_submitted = ListedTime::parse(&self.submitted_on)?;
        let date_uploaded = ListedTime::parse(&self.last_updated)?;
        let record_id = self
            .record_id
            .unwrap_or_else(|| format!("{}_{}", self.ein, self.tax_period));

        Ok(FilingDescriptor {
            record_id,
            irs_efile_id: self.object_id,
            irs_dln: self.dln,
            ein: self.ein,
            period: self.tax_period,
            name_org: self.organization_name,
            form_type: self.form_type,
            date_submitted,
            date_uploaded,
            url: self.url,
        })
    }
}

/// Parse a listing document into its entries, in document order
///
/// Sections and the entries within them keep the order they were published
/// in; a full tie in the index goes to the later entry.
pub fn parse_listing(bytes: &[u8]) -> Result<Vec<ListingEntry>> {
    let sections: IndexMap<String, Vec<ListingEntry>> = serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidInput(format!("Unreadable listing: {}", e)))?;
    Ok(sections.into_values().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{"Filings2011": [{
        "EIN": "208419458",
        "TaxPeriod": "201012",
        "DLN": "93493316004251",
        "FormType": "990",
        "URL": "https://s3.amazonaws.com/irs-form-990/201103169349300325_public.xml",
        "OrganizationName": "EXAMPLE FOUNDATION",
        "SubmittedOn": "2011-03-16",
        "ObjectId": "201103169349300325",
        "LastUpdated": "2016-03-21T17:23:53"
    }]}"#;

    #[test]
    fn test_entry_becomes_descriptor() {
        let entries = parse_listing(LISTING.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);

        let filing = entries.into_iter().next().unwrap().into_descriptor().unwrap();
        assert_eq!(filing.ein, "208419458");
        assert_eq!(filing.period, "201012");
        assert_eq!(filing.irs_efile_id, "201103169349300325");
        assert_eq!(filing.record_id, "208419458_201012");
        assert_eq!(filing.name_org, "EXAMPLE FOUNDATION");
        assert_eq!(filing.date_submitted.as_str(), "2011-03-16");
        assert_eq!(filing.date_uploaded.as_str(), "2016-03-21T17:23:53");
    }

    #[test]
    fn test_sections_keep_document_order() {
        let json = r#"{
            "Filings2012": [{"EIN": "208419458", "TaxPeriod": "201112", "SubmittedOn": "2012-01-01",
                             "ObjectId": "3", "LastUpdated": "2016-03-21T17:23:53"}],
            "Filings2011": [{"EIN": "208419458", "TaxPeriod": "201012", "SubmittedOn": "2011-01-01",
                             "ObjectId": "1", "LastUpdated": "2016-03-21T17:23:53"},
                            {"EIN": "208419458", "TaxPeriod": "201012", "SubmittedOn": "2011-01-01",
                             "ObjectId": "2", "LastUpdated": "2016-03-21T17:23:53"}]
        }"#;
        let ids: Vec<String> = parse_listing(json.as_bytes())
            .unwrap()
            .into_iter()
            .map(|entry| entry.object_id)
            .collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_short_ein_rejected() {
        let json = LISTING.replace("\"208419458\"", "\"2084\"");
        let entry = parse_listing(json.as_bytes()).unwrap().remove(0);
        assert!(entry.into_descriptor().is_err());
    }

    #[test]
    fn test_explicit_record_id_kept() {
        let json = LISTING.replace("\"LastUpdated\"", "\"RecordId\": \"r-1\", \"LastUpdated\"");
        let entry = parse_listing(json.as_bytes()).unwrap().remove(0);
        assert_eq!(entry.into_descriptor().unwrap().record_id, "r-1");
    }

    #[test]
    fn test_listing_key() {
        assert_eq!(listing_key(2016), "index_2016.json");
    }
}
