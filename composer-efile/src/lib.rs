//! composer-efile library interface
//!
//! Turns the public e-file dataset into per-organization composite documents:
//! yearly listings are ingested into a SQLite metadata index, changed filings
//! are fetched and converted into canonical records, and each organization's
//! composite is updated in place.

pub mod codec;
pub mod db;
pub mod index;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use index::{ChangeSet, EfileMetadataIndex};
pub use services::{UpdateEfileState, UpdateSettings, UpdateSummary};
