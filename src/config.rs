//! Run configuration, read from a JSON file and overridden from the command line.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::formats::ApcFormat;
use crate::import::{ImportOptions, default_batch_size};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("No APC file provided.")]
    MissingApcPath,
    #[error("No GTFS directory provided.")]
    MissingGtfsPath,
    #[error("batch_size must be at least 1")]
    InvalidBatchSize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub agency_key: String,
    /// Directory holding the GTFS text files for the agency.
    #[serde(default)]
    pub gtfs_path: Option<PathBuf>,
    #[serde(default)]
    pub apc_path: Option<PathBuf>,
    /// Defaults to `output/<agency_key>`.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    /// Skips format detection when set.
    #[serde(default)]
    pub apc_format: Option<ApcFormat>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Forces the duplicate merge pass on or off.
    #[serde(default)]
    pub merge_duplicates: Option<bool>,
    #[serde(default)]
    pub gzip: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path = expand_home(path);
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Checks what an import needs before any row is read.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.apc_path.is_none() {
            return Err(ConfigError::MissingApcPath);
        }
        if self.gtfs_path.is_none() {
            return Err(ConfigError::MissingGtfsPath);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        Ok(())
    }

    pub fn apc_path(&self) -> Option<PathBuf> {
        self.apc_path.as_deref().map(expand_home)
    }

    pub fn gtfs_path(&self) -> Option<PathBuf> {
        self.gtfs_path.as_deref().map(expand_home)
    }

    pub fn output_path(&self) -> PathBuf {
        match &self.output_path {
            Some(path) => expand_home(path),
            None => Path::new("output").join(&self.agency_key),
        }
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            format: self.apc_format,
            batch_size: self.batch_size,
            merge_duplicates: self.merge_duplicates,
        }
    }
}

/// Expands a leading `~` to `$HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_json(r#"{"agency_key": "cet", "gtfs_path": "gtfs", "apc_path": "apc.csv"}"#).unwrap();

        assert_eq!(config.output_path(), PathBuf::from("output/cet"));
        assert_eq!(config.batch_size, default_batch_size());
        assert_eq!(config.apc_format, None);
        assert_eq!(config.merge_duplicates, None);
        assert!(!config.gzip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_json(
            r#"{
                "agency_key": "weta",
                "gtfs_path": "gtfs",
                "apc_path": "apc.csv",
                "apc_format": "weta",
                "batch_size": 10,
                "merge_duplicates": true,
                "gzip": true
            }"#,
        )
        .unwrap();

        let options = config.import_options();
        assert_eq!(options.format, Some(ApcFormat::Weta));
        assert_eq!(options.batch_size, 10);
        assert_eq!(options.merge_duplicates, Some(true));
    }

    #[test]
    fn test_config_missing_apc_path() {
        let config = Config::from_json(r#"{"agency_key": "cet", "gtfs_path": "gtfs"}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "No APC file provided.");
    }

    #[test]
    fn test_config_unknown_format_rejected() {
        assert!(Config::from_json(r#"{"agency_key": "x", "apc_format": "nope"}"#).is_err());
    }

    #[test]
    fn test_config_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/gtfs_ride/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(Path::new("data/apc.csv")), PathBuf::from("data/apc.csv"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/apc.csv")),
                PathBuf::from(home).join("apc.csv")
            );
        }
    }
}
