//! Error types for bq-stats.
//!
//! Defines the main error enum used throughout the crate. Transient errors are
//! the only ones the query runner will retry.

use thiserror::Error;

/// Main error type for bq-stats operations.
#[derive(Error, Debug)]
pub enum StatsError {
    /// Transport-level failures (connect, timeout, HTTP 5xx, HTTP 429).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service rejected the request (HTTP 4xx other than 429).
    #[error("Service error: {0}")]
    Service(String),

    /// The query job finished with an error result.
    #[error("Job failed: {0}")]
    Job(String),

    /// A response was missing required fields or could not be decoded.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The retry budget for a step was exhausted.
    #[error("Service unreachable while {step} after {attempts} attempts: {last_error}")]
    Unreachable {
        step: String,
        attempts: u32,
        last_error: String,
    },

    /// Credential loading or token acquisition failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Configuration errors (invalid config file, missing project id, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StatsError {
    /// Creates a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a service error with the given message.
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    /// Creates a job error with the given message.
    pub fn job(msg: impl Into<String>) -> Self {
        Self::Job(msg.into())
    }

    /// Creates a malformed response error with the given message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Creates an unreachable error wrapping the last transient failure.
    pub fn unreachable(step: impl Into<String>, attempts: u32, last_error: &StatsError) -> Self {
        Self::Unreachable {
            step: step.into(),
            attempts,
            last_error: last_error.to_string(),
        }
    }

    /// Creates an authentication error with the given message.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the failed call may succeed when repeated unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "Transport Error",
            Self::Service(_) => "Service Error",
            Self::Job(_) => "Job Error",
            Self::MalformedResponse(_) => "Malformed Response",
            Self::Unreachable { .. } => "Service Unreachable",
            Self::Auth(_) => "Authentication Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using StatsError.
pub type Result<T> = std::result::Result<T, StatsError>;
