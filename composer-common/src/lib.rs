//! # Composer Common Library
//!
//! Shared code for the composer workspace:
//! - Error and result types
//! - Configuration loading and resolution
//! - Organization-key path layout

pub mod config;
pub mod error;
pub mod paths;

pub use error::{Error, Result};
pub use paths::OrgPathManager;
