//! Filing descriptor: the unit tracked by the metadata index

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use composer_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A timestamp as published in a listing, with its parsed value
///
/// The text is stored in the index exactly as received; ordering uses the
/// parsed value, so `2011-03-16` and `2011-03-16T00:00:00` rank equal while
/// remaining distinct descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ListedTime {
    raw: String,
    value: NaiveDateTime,
}

impl ListedTime {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Self {
            value: parse_timestamp(raw)?,
            raw: raw.to_string(),
        })
    }

    /// Text as published
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> NaiveDateTime {
        self.value
    }
}

impl TryFrom<String> for ListedTime {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        let value = parse_timestamp(&raw)?;
        Ok(Self { raw, value })
    }
}

impl From<ListedTime> for String {
    fn from(ts: ListedTime) -> Self {
        ts.raw
    }
}

impl fmt::Display for ListedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One submitted e-file and its metadata
///
/// Equality is structural over every field, which is what makes repeated
/// ingestion of identical listing data a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingDescriptor {
    /// Correlates a filing with amendments of the same underlying submission
    pub record_id: String,
    /// Globally unique filing id; also names the raw document object
    pub irs_efile_id: String,
    pub irs_dln: String,
    /// Organization key (fixed-length numeric string)
    pub ein: String,
    /// Filing period key (e.g. "201012")
    pub period: String,
    pub name_org: String,
    pub form_type: String,
    pub date_submitted: ListedTime,
    pub date_uploaded: ListedTime,
    pub url: String,
}

impl FilingDescriptor {
    /// Object key of the raw document in remote storage: `"{filing_id}_public.xml"`
    pub fn object_key(&self) -> String {
        format!("{}_public.xml", self.irs_efile_id)
    }
}

/// Parse a timestamp from the formats found in listings and the index database
///
/// Accepts `YYYY-MM-DD` (midnight), `YYYY-MM-DDTHH:MM:SS` with optional
/// fractional seconds (`T` or space separator), and RFC 3339 with offset
/// (offset dropped, wall-clock time kept).
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.naive_local());
    }

    Err(Error::InvalidInput(format!("Unrecognized timestamp: '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_only_is_midnight() {
        let ts = parse_timestamp("2020-01-01").unwrap();
        assert_eq!(ts.format("%Y-%m-%dT%H:%M:%S").to_string(), "2020-01-01T00:00:00");
    }

    #[test]
    fn test_datetime_variants() {
        let a = parse_timestamp("2016-03-21T17:23:53").unwrap();
        let b = parse_timestamp("2016-03-21 17:23:53").unwrap();
        let c = parse_timestamp("2016-03-21T17:23:53.250").unwrap();
        assert_eq!(a, b);
        assert!(c > a);
    }

    #[test]
    fn test_rfc3339_keeps_wall_clock() {
        let ts = parse_timestamp("2011-02-22T15:44:44-06:00").unwrap();
        assert_eq!(ts, parse_timestamp("2011-02-22T15:44:44").unwrap());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_timestamp("last tuesday").is_err());
        assert!(ListedTime::parse("last tuesday").is_err());
    }

    #[test]
    fn test_listed_time_keeps_published_text() {
        let date_only = ListedTime::parse("2011-03-16").unwrap();
        let midnight = ListedTime::parse("2011-03-16T00:00:00").unwrap();
        let offset = ListedTime::parse("2011-02-22T15:44:44-06:00").unwrap();

        assert_eq!(date_only.as_str(), "2011-03-16");
        assert_eq!(offset.to_string(), "2011-02-22T15:44:44-06:00");
        assert_eq!(date_only.value(), midnight.value());
        assert_ne!(date_only, midnight);
    }

    #[test]
    fn test_listed_time_serializes_as_text() {
        let ts = ListedTime::parse("2016-03-21T17:23:53").unwrap();
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"2016-03-21T17:23:53\"");
        let back: ListedTime = serde_json::from_str("\"2016-03-21T17:23:53\"").unwrap();
        assert_eq!(back, ts);
        assert!(serde_json::from_str::<ListedTime>("\"never\"").is_err());
    }

    #[test]
    fn test_object_key() {
        let filing = FilingDescriptor {
            record_id: "208419458_201012".to_string(),
            irs_efile_id: "201103169349300325".to_string(),
            irs_dln: String::new(),
            ein: "208419458".to_string(),
            period: "201012".to_string(),
            name_org: String::new(),
            form_type: "990".to_string(),
            date_submitted: ListedTime::parse("2011-03-16").unwrap(),
            date_uploaded: ListedTime::parse("2016-03-21T17:23:53").unwrap(),
            url: String::new(),
        };
        assert_eq!(filing.object_key(), "201103169349300325_public.xml");
    }
}
