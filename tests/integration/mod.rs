//! Integration tests for bq-stats.

pub mod live_test;
pub mod runner_test;
