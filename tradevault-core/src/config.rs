//! Application configuration.
//!
//! Paths and tuning live in a TOML file; API credentials come from the
//! environment (a `.env` file is loaded by the binary before this runs).
//!
//! ```toml
//! [file_paths]
//! base_output_path = "/data/output"
//! stock_targets_csv = "/data/stock_ticker_targets.csv"
//! filings_targets_csv = "/data/stocks_filings_targets.csv"
//!
//! [api_settings]
//! max_concurrent_requests = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MARKET_DATA_KEY_VAR: &str = "POLYGON_API_KEY";
pub const FILINGS_KEY_VAR: &str = "SEC_API_IO_KEY";

pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("'base_output_path' is missing or empty in [file_paths]")]
    MissingBasePath,

    #[error("'{0}' is not set in [file_paths]")]
    MissingPath(&'static str),

    #[error("'{0}' not found in the environment; set it in your .env file")]
    MissingCredential(&'static str),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub file_paths: FilePaths,
    #[serde(default)]
    pub api_settings: ApiSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePaths {
    #[serde(default)]
    pub base_output_path: PathBuf,
    #[serde(default)]
    pub stock_targets_csv: Option<PathBuf>,
    #[serde(default)]
    pub filings_targets_csv: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

impl AppConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.file_paths.base_output_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingBasePath);
        }
        if self.api_settings.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_requests must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn base_output_path(&self) -> &Path {
        &self.file_paths.base_output_path
    }

    pub fn stock_targets_csv(&self) -> Result<&Path, ConfigError> {
        self.file_paths
            .stock_targets_csv
            .as_deref()
            .ok_or(ConfigError::MissingPath("stock_targets_csv"))
    }

    pub fn filings_targets_csv(&self) -> Result<&Path, ConfigError> {
        self.file_paths
            .filings_targets_csv
            .as_deref()
            .ok_or(ConfigError::MissingPath("filings_targets_csv"))
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.api_settings.max_concurrent_requests
    }
}

/// Read an API key from the environment. Empty values count as missing.
pub fn credential(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingCredential(var)),
    }
}
