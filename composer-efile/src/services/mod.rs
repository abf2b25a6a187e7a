//! Pipeline services

pub mod compose;
pub mod indices;
pub mod retrieve;
pub mod update;

pub use compose::ComposeEfiles;
pub use indices::{EfileIndices, IngestSummary};
pub use retrieve::{JsonChanges, RetrieveEfiles};
pub use update::{UpdateEfileState, UpdateSettings, UpdateSummary};
