//! Command-line argument parsing for bq-stats.

use bq_stats::config::{BigQueryConfig, Config, RetryConfig};
use bq_stats::runner::{Backoff, Parameter};
use bq_stats::{logging, Result, StatsError};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// A pretty-printed JSON array of records.
    #[default]
    Json,
    /// One compact JSON object per line.
    Jsonl,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" | "ndjson" => Ok(Self::Jsonl),
            _ => Err(format!("Invalid output format: {s}. Expected: json or jsonl")),
        }
    }
}

/// Run a BigQuery query and print the results as JSON records.
#[derive(Parser, Debug)]
#[command(name = "bq-stats")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQL to run (standard SQL, named parameters as @name)
    #[arg(value_name = "QUERY", conflicts_with = "file")]
    pub query: Option<String>,

    /// Read the SQL from a file (use "-" for stdin)
    #[arg(short = 'f', long, value_name = "PATH")]
    pub file: Option<String>,

    /// Query parameter as NAME:TYPE:VALUE (repeatable)
    #[arg(short = 'P', long = "param", value_name = "NAME:TYPE:VALUE")]
    pub params: Vec<Parameter>,

    /// BigQuery project id
    #[arg(long, value_name = "PROJECT")]
    pub project: Option<String>,

    /// Default dataset id
    #[arg(long, value_name = "DATASET")]
    pub dataset: Option<String>,

    /// Service account key file
    #[arg(long, value_name = "PATH")]
    pub credentials: Option<PathBuf>,

    /// OAuth2 access token (overrides credentials)
    #[arg(
        long,
        value_name = "TOKEN",
        env = "BIGQUERY_ACCESS_TOKEN",
        hide_env_values = true
    )]
    pub access_token: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Give up after N consecutive transient failures (default: retry forever)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Seconds between job status polls and retries
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: Option<u64>,

    /// Retry delay growth: none, linear or exponential
    #[arg(long, value_name = "BACKOFF")]
    pub backoff: Option<Backoff>,

    /// Output format: json or jsonl
    #[arg(long, value_name = "FORMAT", default_value = "json")]
    pub output: OutputFormat,

    /// Write logs to a file instead of stderr (default: bq-stats state directory)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub log_file: Option<Option<PathBuf>>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the log file to write to, if file logging was requested.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(logging::default_log_path))
    }

    /// Returns the SQL text from the positional argument, a file, or stdin.
    pub fn read_query(&self) -> Result<String> {
        let sql = match (&self.query, self.file.as_deref()) {
            (Some(query), _) => query.clone(),
            (None, Some("-")) => {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf).map_err(|e| {
                    StatsError::config(format!("Failed to read query from stdin: {e}"))
                })?;
                buf
            }
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                StatsError::config(format!("Failed to read query file {path}: {e}"))
            })?,
            (None, None) => {
                return Err(StatsError::config(
                    "No query given. Pass QUERY or --file PATH",
                ))
            }
        };

        if sql.trim().is_empty() {
            return Err(StatsError::config("Query is empty"));
        }
        Ok(sql)
    }

    /// Returns the query parameters, or `None` if none were given.
    pub fn parameters(&self) -> Option<&[Parameter]> {
        if self.params.is_empty() {
            None
        } else {
            Some(self.params.as_slice())
        }
    }

    /// Applies CLI overrides on top of file configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        self.apply_bigquery_overrides(&mut config.bigquery);
        self.apply_retry_overrides(&mut config.retry);
    }

    fn apply_bigquery_overrides(&self, bigquery: &mut BigQueryConfig) {
        if self.project.is_some() {
            bigquery.project_id = self.project.clone();
        }
        if self.dataset.is_some() {
            bigquery.dataset_id = self.dataset.clone();
        }
        if self.credentials.is_some() {
            bigquery.credentials_path = self.credentials.clone();
        }
        if self.access_token.is_some() {
            bigquery.access_token = self.access_token.clone();
        }
    }

    fn apply_retry_overrides(&self, retry: &mut RetryConfig) {
        if self.max_attempts.is_some() {
            retry.max_attempts = self.max_attempts;
        }
        if let Some(secs) = self.poll_interval {
            retry.poll_interval_secs = secs;
        }
        if let Some(backoff) = self.backoff {
            retry.backoff = backoff;
        }
    }
}
