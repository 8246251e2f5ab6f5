//! Configuration management for bq-stats.
//!
//! Handles loading configuration from TOML files and environment variables.
//! Command-line flags are applied on top by the binary.

use crate::error::{Result, StatsError};
use crate::runner::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default BigQuery REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Main configuration structure for bq-stats.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// BigQuery project, dataset, and credentials.
    #[serde(default)]
    pub bigquery: BigQueryConfig,

    /// Retry behavior for polling and page fetches.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// BigQuery connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQueryConfig {
    /// Project that runs (and is billed for) the queries.
    pub project_id: Option<String>,

    /// Default dataset for unqualified table names.
    pub dataset_id: Option<String>,

    /// Path to a service account key file.
    pub credentials_path: Option<PathBuf>,

    /// Pre-issued OAuth2 access token. Only taken from the environment or CLI.
    #[serde(skip)]
    pub access_token: Option<String>,

    /// REST API base URL (override for emulators).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset_id: None,
            credentials_path: None,
            access_token: None,
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BigQueryConfig {
    /// Applies environment variables as defaults for unset fields.
    ///
    /// Reads `BIGQUERY_PROJECT_ID`, `BIGQUERY_DATASET_ID`,
    /// `GOOGLE_APPLICATION_CREDENTIALS` and `BIGQUERY_ACCESS_TOKEN`.
    pub fn apply_env_defaults(&mut self) {
        if self.project_id.is_none() {
            self.project_id = std::env::var("BIGQUERY_PROJECT_ID").ok();
        }
        if self.dataset_id.is_none() {
            self.dataset_id = std::env::var("BIGQUERY_DATASET_ID").ok();
        }
        if self.credentials_path.is_none() {
            self.credentials_path = std::env::var("GOOGLE_APPLICATION_CREDENTIALS")
                .ok()
                .map(PathBuf::from);
        }
        if self.access_token.is_none() {
            self.access_token = std::env::var("BIGQUERY_ACCESS_TOKEN").ok();
        }
    }

    /// Returns the project id, or a configuration error if it is missing.
    pub fn project_id(&self) -> Result<&str> {
        self.project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StatsError::config("BigQuery project id is required"))
    }

    /// Returns the dataset id, or a configuration error if it is missing.
    pub fn dataset_id(&self) -> Result<&str> {
        self.dataset_id
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| StatsError::config("BigQuery dataset id is required"))
    }

    /// Parses and returns the API base URL.
    pub fn api_base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.api_base_url)
            .map_err(|e| StatsError::config(format!("Invalid api_base_url: {e}")))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(StatsError::config(format!(
                "Invalid scheme '{}'. Expected 'https' or 'http'",
                url.scheme()
            )));
        }

        Ok(url)
    }

    /// Checks that everything needed to run a query is present.
    pub fn validate(&self) -> Result<()> {
        self.project_id()?;
        self.dataset_id()?;
        self.api_base_url()?;
        if self.timeout_secs == 0 {
            return Err(StatsError::config("timeout_secs must be greater than 0"));
        }
        Ok(())
    }

    /// Returns a display-safe string (no credentials) for log output.
    pub fn display_string(&self) -> String {
        let project = self.project_id.as_deref().unwrap_or("unknown");
        let dataset = self.dataset_id.as_deref().unwrap_or("unknown");
        format!("{project}.{dataset}")
    }
}

/// Retry configuration as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Give up after this many consecutive transient failures. Unbounded if unset.
    pub max_attempts: Option<u32>,

    /// Seconds between job status polls and between retries.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How the retry delay grows with consecutive failures.
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            poll_interval_secs: default_poll_interval_secs(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Converts the file representation into a runtime retry policy.
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        if self.max_attempts == Some(0) {
            return Err(StatsError::config("max_attempts must be at least 1"));
        }
        if self.poll_interval_secs == 0 {
            return Err(StatsError::config("poll_interval_secs must be at least 1"));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            backoff: self.backoff,
        })
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bq-stats")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// A missing file is not an error; defaults are returned instead.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| StatsError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            StatsError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
