//! BigQuery service layer for bq-stats.
//!
//! Provides a trait-based interface for the three remote operations the query
//! runner needs, so the REST client can be swapped for a scripted mock in tests.

mod auth;
mod client;
mod mock;
mod types;

pub use auth::Authenticator;
pub use client::BigQueryClient;
pub use mock::{MockQueryService, ServiceCall};
pub use types::{
    DatasetReference, ErrorProto, Job, JobReference, JobStatus, QueryParameter,
    QueryParameterType, QueryParameterValue, QueryRequest, QueryResponse, TableCell,
    TableFieldSchema, TableRow, TableSchema, JOB_STATE_DONE,
};

use crate::error::Result;
use async_trait::async_trait;

/// Trait defining the remote query service.
///
/// Implementations report retryable failures as `StatsError::Transport`.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Submits a query (`jobs.query`). The response may or may not be complete.
    async fn submit_query(
        &self,
        project_id: &str,
        request: &QueryRequest,
    ) -> Result<QueryResponse>;

    /// Fetches job status (`jobs.get`).
    async fn get_job(&self, job: &JobReference) -> Result<Job>;

    /// Fetches a page of results for a job (`jobs.getQueryResults`).
    ///
    /// `None` requests the first page.
    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse>;
}
