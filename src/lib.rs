//! bq-stats - run parameterized BigQuery statistics queries.
//!
//! This library exposes the core modules for use by the binary and in
//! integration tests.

pub mod bigquery;
pub mod config;
pub mod error;
pub mod logging;
pub mod runner;

pub use error::{Result, StatsError};
pub use runner::{init, Parameter, QueryRunner, Record, RetryPolicy};
