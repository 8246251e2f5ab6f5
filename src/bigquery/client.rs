//! BigQuery REST client.
//!
//! Implements the `QueryService` trait over the BigQuery v2 REST API using reqwest.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::bigquery::auth::Authenticator;
use crate::bigquery::types::{ApiErrorResponse, Job, JobReference, QueryRequest, QueryResponse};
use crate::bigquery::QueryService;
use crate::config::BigQueryConfig;
use crate::error::{Result, StatsError};

/// Error reasons BigQuery attaches to failures that succeed when retried.
/// Rate limiting arrives as 403 with one of these, not as 429.
const RETRYABLE_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "backendError",
    "internalError",
];

/// BigQuery REST client.
#[derive(Debug)]
pub struct BigQueryClient {
    base_url: Url,
    http: Client,
    auth: Authenticator,
}

impl BigQueryClient {
    /// Creates a client with an explicit endpoint, timeout and authenticator.
    pub fn new(base_url: Url, timeout: Duration, auth: Authenticator) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StatsError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            auth,
        })
    }

    /// Creates a client from configuration, loading credentials as needed.
    pub async fn from_config(config: &BigQueryConfig) -> Result<Self> {
        let base_url = config.api_base_url()?;
        let auth = Authenticator::from_config(config).await?;
        Self::new(base_url, Duration::from_secs(config.timeout_secs), auth)
    }

    /// Builds an endpoint URL by appending path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StatsError::config(format!("Invalid API base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a request and decodes a JSON response body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = match self.auth.token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(Self::request_error)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StatsError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| StatsError::malformed(format!("Failed to parse response: {e}")))
    }

    /// Maps a non-success HTTP status to an error.
    ///
    /// Server errors, 429 and rate-limit or backend reasons are transient.
    /// Everything else is fatal.
    fn parse_error(status: StatusCode, body: &str) -> StatsError {
        let (message, retryable_reason) = match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(response) => {
                let error = response.error;
                let message = match &error.status {
                    Some(code) => format!("{} ({}): {}", status, code, error.message),
                    None => format!("{}: {}", status, error.message),
                };
                (message, error.has_reason(RETRYABLE_REASONS))
            }
            Err(_) => (format!("{}: {}", status, body), false),
        };

        let transient = status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || retryable_reason;
        if transient {
            StatsError::transport(format!("BigQuery API error {message}"))
        } else {
            StatsError::service(format!("BigQuery API error {message}"))
        }
    }

    /// Maps a reqwest send failure to an error.
    fn request_error(error: reqwest::Error) -> StatsError {
        if error.is_builder() {
            StatsError::internal(format!("Failed to build request: {error}"))
        } else if error.is_timeout() {
            StatsError::transport("Request timed out")
        } else if error.is_connect() {
            StatsError::transport(format!("Failed to connect to BigQuery API: {error}"))
        } else {
            StatsError::transport(format!("Request failed: {error}"))
        }
    }

    fn with_location(request: RequestBuilder, job: &JobReference) -> RequestBuilder {
        match &job.location {
            Some(location) => request.query(&[("location", location.as_str())]),
            None => request,
        }
    }
}

#[async_trait]
impl QueryService for BigQueryClient {
    async fn submit_query(
        &self,
        project_id: &str,
        request: &QueryRequest,
    ) -> Result<QueryResponse> {
        let url = self.endpoint(&["projects", project_id, "queries"])?;
        debug!("POST {}", url);
        self.send(self.http.post(url).json(request)).await
    }

    async fn get_job(&self, job: &JobReference) -> Result<Job> {
        let url = self.endpoint(&[
            "projects",
            job.project_id.as_str(),
            "jobs",
            job.job_id.as_str(),
        ])?;
        debug!("GET {}", url);
        self.send(Self::with_location(self.http.get(url), job)).await
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let url = self.endpoint(&[
            "projects",
            job.project_id.as_str(),
            "queries",
            job.job_id.as_str(),
        ])?;
        debug!("GET {} (page token: {:?})", url, page_token);
        let mut request = Self::with_location(self.http.get(url), job);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        self.send(request).await
    }
}
