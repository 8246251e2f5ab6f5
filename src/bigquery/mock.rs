//! Mock query service for testing.
//!
//! Replays scripted responses per operation and records every call, so tests
//! can assert on exactly which requests the runner made.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::types::{
    Job, JobReference, JobStatus, QueryRequest, QueryResponse, TableRow, TableSchema,
};
use super::QueryService;
use crate::error::{Result, StatsError};

/// A call made against the mock, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    SubmitQuery {
        project_id: String,
        request: QueryRequest,
    },
    GetJob(JobReference),
    GetQueryResults {
        job: JobReference,
        page_token: Option<String>,
    },
}

/// A query service that returns predefined responses.
#[derive(Debug, Default)]
pub struct MockQueryService {
    submit_responses: Mutex<VecDeque<Result<QueryResponse>>>,
    job_responses: Mutex<VecDeque<Result<Job>>>,
    result_responses: Mutex<VecDeque<Result<QueryResponse>>>,
    calls: Mutex<Vec<ServiceCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockQueryService {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for the next `submit_query` call.
    pub fn with_submit_response(self, response: Result<QueryResponse>) -> Self {
        lock(&self.submit_responses).push_back(response);
        self
    }

    /// Queues a response for the next `get_job` call.
    pub fn with_job_response(self, response: Result<Job>) -> Self {
        lock(&self.job_responses).push_back(response);
        self
    }

    /// Queues a response for the next `get_query_results` call.
    pub fn with_results_response(self, response: Result<QueryResponse>) -> Self {
        lock(&self.result_responses).push_back(response);
        self
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<ServiceCall> {
        lock(&self.calls).clone()
    }

    /// Returns the number of `submit_query` calls made so far.
    pub fn submit_count(&self) -> usize {
        self.count(|c| matches!(c, ServiceCall::SubmitQuery { .. }))
    }

    /// Returns the number of `get_job` calls made so far.
    pub fn poll_count(&self) -> usize {
        self.count(|c| matches!(c, ServiceCall::GetJob(_)))
    }

    /// Returns the page tokens of every `get_query_results` call, in order.
    pub fn results_fetches(&self) -> Vec<Option<String>> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                ServiceCall::GetQueryResults { page_token, .. } => Some(page_token.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&ServiceCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: ServiceCall) {
        lock(&self.calls).push(call);
    }

    fn next<T>(queue: &Mutex<VecDeque<Result<T>>>, operation: &str) -> Result<T> {
        lock(queue).pop_front().unwrap_or_else(|| {
            Err(StatsError::internal(format!(
                "MockQueryService: no scripted response for {operation}"
            )))
        })
    }

    /// Builds a response for a job that has not finished yet.
    pub fn incomplete(job: &JobReference) -> QueryResponse {
        QueryResponse {
            job_reference: Some(job.clone()),
            job_complete: Some(false),
            ..Default::default()
        }
    }

    /// Builds a complete results page.
    pub fn page(
        job: &JobReference,
        schema: &TableSchema,
        rows: Vec<TableRow>,
        page_token: Option<&str>,
    ) -> QueryResponse {
        QueryResponse {
            job_reference: Some(job.clone()),
            job_complete: Some(true),
            schema: Some(schema.clone()),
            total_rows: Some(rows.len().to_string()),
            rows: Some(rows),
            page_token: page_token.map(String::from),
        }
    }

    /// Builds a job status response with the given state.
    pub fn job_state(state: &str) -> Job {
        Job {
            job_reference: None,
            status: JobStatus {
                state: state.to_string(),
                error_result: None,
            },
        }
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn submit_query(
        &self,
        project_id: &str,
        request: &QueryRequest,
    ) -> Result<QueryResponse> {
        self.record(ServiceCall::SubmitQuery {
            project_id: project_id.to_string(),
            request: request.clone(),
        });
        Self::next(&self.submit_responses, "submit_query")
    }

    async fn get_job(&self, job: &JobReference) -> Result<Job> {
        self.record(ServiceCall::GetJob(job.clone()));
        Self::next(&self.job_responses, "get_job")
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        self.record(ServiceCall::GetQueryResults {
            job: job.clone(),
            page_token: page_token.map(String::from),
        });
        Self::next(&self.result_responses, "get_query_results")
    }
}
