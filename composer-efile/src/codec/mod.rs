//! Structural codec: e-file markup → canonical record
//!
//! `convert` cleans the raw document (ASCII filter, declaration and namespace
//! removal, element-prefix stripping), parses it into an element tree and
//! folds the tree into an ordered, attribute-aware record. The folding rules
//! are fixed and intentionally lossy; see [`fold`] for the full list.

pub mod clean;
pub mod fold;
pub mod node;
pub mod tree;

pub use node::{CanonicalRecord, Entries, Node};

use thiserror::Error;

/// Conversion failures. Both are fatal for the one document only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Element holds both non-whitespace text and child elements
    #[error("Mixed text and tags in {tag}")]
    MixedContent { tag: String },

    /// Input is not well-formed markup after cleanup
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
}

impl From<CodecError> for composer_common::Error {
    fn from(err: CodecError) -> Self {
        composer_common::Error::Conversion(err.to_string())
    }
}

/// Convert a raw e-file document into its canonical record
pub fn convert(raw_document: &[u8]) -> Result<CanonicalRecord, CodecError> {
    let cleaned = clean::clean(raw_document);
    let root = tree::parse(&cleaned)?;
    fold::fold_root(&root)
}

/// Convert and serialize to compact JSON
pub fn convert_to_json(raw_document: &[u8]) -> composer_common::Result<Vec<u8>> {
    let record = convert(raw_document)?;
    Ok(serde_json::to_vec(&record)?)
}
