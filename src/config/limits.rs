//! Batch limits loaded from `showlist.toml`.
//!
//! Every bulk entry point checks its cap before processing the first item, so an
//! oversized request is refused outright instead of being partially applied.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the whole `showlist.toml` file
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Batch caps; the table may be omitted entirely
    #[serde(default)]
    pub limits: BatchLimits,
}

/// Hard caps on the number of items a single bulk call may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    /// Markdown files per bulk preview/confirm
    pub max_bulk_import: usize,
    /// Shows per bulk markdown export
    pub max_bulk_export: usize,
    /// Keys per discovery `check_events` call
    pub max_discovery_check: usize,
    /// Events per discovery `import_events` call
    pub max_discovery_import: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_bulk_import: 50,
            max_bulk_export: 200,
            max_discovery_check: 500,
            max_discovery_import: 100,
        }
    }
}

impl BatchLimits {
    /// Rejects caps of zero, which would make the matching bulk endpoint unusable.
    pub fn validate(&self) -> Result<()> {
        let caps = [
            ("max_bulk_import", self.max_bulk_import),
            ("max_bulk_export", self.max_bulk_export),
            ("max_discovery_check", self.max_discovery_check),
            ("max_discovery_import", self.max_discovery_import),
        ];
        if let Some((name, _)) = caps.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config {
                message: format!("limits.{name} must be greater than zero"),
            });
        }
        Ok(())
    }

    /// Fails with `ValidationFailed` when `count` exceeds `cap`.
    pub fn check(what: &str, count: usize, cap: usize) -> Result<()> {
        if count > cap {
            return Err(Error::validation(format!(
                "{what}: {count} items exceeds the limit of {cap}"
            )));
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML is invalid, or a cap is zero.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads `./showlist.toml`, falling back to defaults when the file is absent.
pub fn load_default_config() -> Result<Config> {
    let path = Path::new("showlist.toml");
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse showlist.toml: {e}"),
    })?;
    config.limits.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_partial_limits_keep_defaults() {
        let config = parse_config(
            r"
            [limits]
            max_bulk_import = 10
        ",
        )
        .unwrap();
        assert_eq!(config.limits.max_bulk_import, 10);
        assert_eq!(config.limits.max_bulk_export, 200);
        assert_eq!(config.limits.max_discovery_import, 100);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.limits, BatchLimits::default());
    }

    #[test]
    fn test_zero_cap_is_rejected() {
        let result = parse_config("[limits]\nmax_discovery_check = 0\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_check_cap() {
        assert!(BatchLimits::check("bulk import", 50, 50).is_ok());
        assert!(matches!(
            BatchLimits::check("bulk import", 51, 50),
            Err(Error::ValidationFailed { .. })
        ));
    }
}
