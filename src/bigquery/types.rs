//! BigQuery REST API wire types.
//!
//! Only the fields this crate reads or writes are modelled. Unknown fields in
//! responses are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job state reported by `jobs.get` once a job has finished.
pub const JOB_STATE_DONE: &str = "DONE";

/// Request body for `jobs.query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub kind: String,
    pub query: String,
    pub use_legacy_sql: bool,
    pub parameter_mode: String,
    pub default_dataset: DatasetReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_parameters: Option<Vec<QueryParameter>>,
    /// Idempotency key. Resending a request with the same id returns the
    /// original job instead of starting a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl QueryRequest {
    /// Creates a standard-SQL, named-parameter request against a default dataset.
    pub fn new(
        query: impl Into<String>,
        default_dataset: DatasetReference,
        query_parameters: Option<Vec<QueryParameter>>,
    ) -> Self {
        Self {
            kind: "bigquery#queryRequest".to_string(),
            query: query.into(),
            use_legacy_sql: false,
            parameter_mode: "NAMED".to_string(),
            default_dataset,
            query_parameters,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReference {
    pub project_id: String,
    pub dataset_id: String,
}

/// A named query parameter in BigQuery's nested descriptor shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameter {
    pub name: String,
    pub parameter_type: QueryParameterType,
    pub parameter_value: QueryParameterValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameterType {
    #[serde(rename = "type")]
    pub param_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameterValue {
    pub value: String,
}

/// Identifies a query job. Passed back verbatim when polling and paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl JobReference {
    pub fn new(project_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            job_id: job_id.into(),
            location: None,
        }
    }
}

/// Response of `jobs.query` and `jobs.getQueryResults`.
///
/// Both endpoints return the same shape for the fields used here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub job_complete: Option<bool>,
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Option<Vec<TableRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<String>,
}

/// Response of `jobs.get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    pub status: JobStatus,
}

impl Job {
    /// Returns true if the service reports the job as finished.
    pub fn is_done(&self) -> bool {
        self.status.state == JOB_STATE_DONE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_result: Option<ErrorProto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

impl TableSchema {
    /// Creates a schema from bare field names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: names
                .into_iter()
                .map(|name| TableFieldSchema {
                    name: name.into(),
                    field_type: None,
                    mode: None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// One result row: cells in schema order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(rename = "f", default)]
    pub cells: Vec<TableCell>,
}

impl TableRow {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            cells: values
                .into_iter()
                .map(|v| TableCell { value: v.into() })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(rename = "v", default)]
    pub value: Value,
}

/// Error body returned with non-success HTTP statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

impl ApiError {
    /// Returns true if any detail carries the given reason.
    pub fn has_reason(&self, reasons: &[&str]) -> bool {
        self.errors
            .iter()
            .filter_map(|e| e.reason.as_deref())
            .any(|reason| reasons.contains(&reason))
    }
}
