//! Configuration loading and resolution
//!
//! Every setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`COMPOSER_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file is not fatal: it is logged and the
//! remaining tiers apply.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Public bucket holding raw e-file documents and yearly listings
pub const DEFAULT_SOURCE: &str = "https://s3.amazonaws.com/irs-form-990";

/// First year with published e-file listings
pub const DEFAULT_FIRST_YEAR: i32 = 2011;

/// Lock wait applied to index commits when nothing else is configured
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "composer_efile=debug"
    pub level: Option<String>,
}

/// Contents of `composer.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub data_path: Option<PathBuf>,
    pub temp_path: Option<PathBuf>,
    pub no_cleanup: Option<bool>,
    pub source: Option<String>,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    pub workers: Option<usize>,
    pub io_workers: Option<usize>,
    pub max_lock_wait_ms: Option<u64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default config file location (`~/.config/composer/composer.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("composer").join("composer.toml"))
}

/// Load the TOML config from `path`, or from the default location when `path` is None.
///
/// An explicitly named file that cannot be read or parsed is an error; a
/// missing default file only yields `None`.
pub fn load_toml_config(path: Option<&Path>) -> Result<Option<TomlConfig>> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(None),
        },
    };

    if !path.exists() {
        if explicit {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    match toml::from_str::<TomlConfig>(&content) {
        Ok(config) => Ok(Some(config)),
        Err(e) if explicit => Err(Error::Config(format!("Parse TOML failed: {}", e))),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unparsable config file");
            Ok(None)
        }
    }
}

/// Resolve one setting: CLI → ENV → TOML → default
pub fn resolve_setting<T>(
    cli_arg: Option<T>,
    env_var_name: &str,
    toml_value: Option<T>,
    default: impl FnOnce() -> T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = cli_arg {
        return Ok(value);
    }

    if let Ok(raw) = std::env::var(env_var_name) {
        return raw.parse::<T>().map_err(|e| {
            Error::Config(format!("Invalid value for {}: '{}' ({})", env_var_name, raw, e))
        });
    }

    if let Some(value) = toml_value {
        return Ok(value);
    }

    Ok(default())
}

/// Number of CPU workers when nothing is configured
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_wins_over_everything() {
        let value = resolve_setting(Some(4usize), "COMPOSER_TEST_UNSET_CLI", Some(8), || 1).unwrap();
        assert_eq!(value, 4);
    }

    #[test]
    fn test_toml_used_when_no_cli_or_env() {
        let value = resolve_setting(None, "COMPOSER_TEST_UNSET_TOML", Some(8usize), || 1).unwrap();
        assert_eq!(value, 8);
    }

    #[test]
    fn test_default_when_nothing_set() {
        let value: usize = resolve_setting(None, "COMPOSER_TEST_UNSET_DEFAULT", None, || 3).unwrap();
        assert_eq!(value, 3);
    }
}
