//! Query execution against BigQuery.
//!
//! `QueryRunner` submits a query, polls the job until it is done, follows
//! result page tokens and reshapes the rows into records. Every remote call is
//! made sequentially; awaiting `run_query` occupies the calling task until the
//! last page has arrived.

mod params;
mod records;
mod retry;

pub use params::{to_query_parameters, Parameter};
pub use records::{reshape, Record};
pub use retry::{Backoff, RetryPolicy, DEFAULT_POLL_INTERVAL};

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bigquery::{
    BigQueryClient, DatasetReference, JobReference, QueryRequest, QueryResponse, QueryService,
    TableRow,
};
use crate::config::Config;
use crate::error::{Result, StatsError};

/// Creates a runner backed by the BigQuery REST API.
///
/// Validates the configuration and loads credentials. This must succeed before
/// any query can run.
pub async fn init(config: &Config) -> Result<QueryRunner> {
    config.bigquery.validate()?;
    let retry = config.retry.to_policy()?;
    let client = BigQueryClient::from_config(&config.bigquery).await?;

    info!(
        "BigQuery client ready for {} (retry: {})",
        config.bigquery.display_string(),
        retry
    );

    Ok(QueryRunner::new(
        Arc::new(client),
        config.bigquery.project_id()?,
        config.bigquery.dataset_id()?,
    )
    .with_retry_policy(retry))
}

/// Runs queries and collects their results as records.
pub struct QueryRunner {
    service: Arc<dyn QueryService>,
    project_id: String,
    dataset_id: String,
    retry: RetryPolicy,
    submit_retry: RetryPolicy,
}

impl QueryRunner {
    /// Creates a runner over any query service, with the default retry policy.
    pub fn new(
        service: Arc<dyn QueryService>,
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
    ) -> Self {
        Self {
            service,
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            retry: RetryPolicy::default(),
            submit_retry: RetryPolicy::submission(),
        }
    }

    /// Sets the policy for polling and page fetches.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the policy for the initial submission.
    pub fn with_submit_retry_policy(mut self, submit_retry: RetryPolicy) -> Self {
        self.submit_retry = submit_retry;
        self
    }

    /// Runs a query and returns every result row, in order, as a record.
    ///
    /// Transient submission errors are retried under the bounded submit
    /// policy. Every attempt carries the same request id, so the service
    /// starts at most one job. Transient errors while polling or paging are
    /// retried according to the retry policy.
    pub async fn run_query(
        &self,
        query: &str,
        parameters: Option<&[Parameter]>,
    ) -> Result<Vec<Record>> {
        let start = Instant::now();
        let request = self.build_request(query, parameters);

        let response = self
            .retry_transient(&self.submit_retry, "submitting query", || {
                self.service.submit_query(&self.project_id, &request)
            })
            .await?;
        let job = response
            .job_reference
            .clone()
            .ok_or_else(|| StatsError::malformed("Query response has no jobReference"))?;
        info!("Submitted query as job {}", job.job_id);

        let first_page = if response.job_complete == Some(true) {
            response
        } else {
            debug!("Job {}: AWAITING_COMPLETION", job.job_id);
            self.wait_for_completion(&job).await?;
            self.fetch_first_page(&job).await?
        };

        debug!("Job {}: FETCHING_PAGES", job.job_id);
        let schema = first_page
            .schema
            .ok_or_else(|| StatsError::malformed("Query results have no schema"))?;
        let rows = self
            .follow_pages(
                &job,
                first_page.rows.unwrap_or_default(),
                first_page.page_token,
            )
            .await?;

        let records = reshape(&schema, rows)?;
        info!(
            "Job {} returned {} records in {:?}",
            job.job_id,
            records.len(),
            start.elapsed()
        );
        Ok(records)
    }

    /// Builds the `jobs.query` request body.
    fn build_request(&self, query: &str, parameters: Option<&[Parameter]>) -> QueryRequest {
        QueryRequest::new(
            query,
            DatasetReference {
                project_id: self.project_id.clone(),
                dataset_id: self.dataset_id.clone(),
            },
            to_query_parameters(parameters),
        )
        .with_request_id(Uuid::new_v4().to_string())
    }

    /// Polls job status until the service reports it done.
    async fn wait_for_completion(&self, job: &JobReference) -> Result<()> {
        let step = format!("polling job {}", job.job_id);

        loop {
            let status = self
                .retry_transient(&self.retry, &step, || self.service.get_job(job))
                .await?;

            if status.is_done() {
                if let Some(error) = status.status.error_result {
                    return Err(StatsError::job(match error.reason {
                        Some(reason) => format!("{} ({}): {}", job.job_id, reason, error.message),
                        None => format!("{}: {}", job.job_id, error.message),
                    }));
                }
                debug!("Job {} is done", job.job_id);
                return Ok(());
            }

            debug!(
                "Job {} is {}, checking again in {:?}",
                job.job_id, status.status.state, self.retry.poll_interval
            );
            sleep(self.retry.poll_interval).await;
        }
    }

    async fn fetch_first_page(&self, job: &JobReference) -> Result<QueryResponse> {
        let step = format!("fetching first results page of job {}", job.job_id);
        self.retry_transient(&self.retry, &step, || {
            self.service.get_query_results(job, None)
        })
        .await
    }

    /// Appends every following page to `rows` until a page carries no token.
    ///
    /// An empty token is still a token.
    async fn follow_pages(
        &self,
        job: &JobReference,
        mut rows: Vec<TableRow>,
        mut page_token: Option<String>,
    ) -> Result<Vec<TableRow>> {
        let mut pages = 1;

        while let Some(token) = page_token.take() {
            let step = format!("fetching results page {} of job {}", pages + 1, job.job_id);
            let page = self
                .retry_transient(&self.retry, &step, || {
                    self.service.get_query_results(job, Some(token.as_str()))
                })
                .await?;

            pages += 1;
            rows.extend(page.rows.unwrap_or_default());
            page_token = page.page_token;
        }

        debug!(
            "Job {}: read {} rows over {} pages",
            job.job_id,
            rows.len(),
            pages
        );
        Ok(rows)
    }

    /// Repeats `call` while it fails with a transient error.
    ///
    /// Non-transient errors return immediately. When the policy has a budget,
    /// running out of attempts returns `StatsError::Unreachable`.
    async fn retry_transient<'f, T, F>(
        &self,
        policy: &RetryPolicy,
        step: &str,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> BoxFuture<'f, Result<T>>,
    {
        let mut failures = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if policy.is_exhausted(failures) {
                        error!("Giving up {} after {} attempts: {}", step, failures, e);
                        return Err(StatsError::unreachable(step, failures, &e));
                    }

                    let delay = policy.delay_for(failures);
                    warn!(
                        "Error while {} (attempt {}), retrying in {:?}: {}",
                        step, failures, delay, e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
