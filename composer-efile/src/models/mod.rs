//! Data models

pub mod filing;
pub mod listing;

pub use filing::{parse_timestamp, FilingDescriptor, ListedTime};
pub use listing::{listing_key, parse_listing, ListingEntry};
