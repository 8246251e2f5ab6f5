//! Access token acquisition for the BigQuery API.

use std::fmt;
use std::path::Path;

use tracing::debug;
use yup_oauth2::authenticator::DefaultAuthenticator;

use crate::config::BigQueryConfig;
use crate::error::{Result, StatsError};

/// OAuth2 scope required for running queries.
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/bigquery"];

/// Source of bearer tokens for API requests.
pub enum Authenticator {
    /// No Authorization header (local emulators).
    Anonymous,
    /// A pre-issued access token used as-is.
    Static(String),
    /// Tokens minted and refreshed from a service account key.
    ServiceAccount(Box<DefaultAuthenticator>),
}

impl Authenticator {
    /// Builds an authenticator from configuration.
    ///
    /// An explicit access token wins over a service account key file.
    pub async fn from_config(config: &BigQueryConfig) -> Result<Self> {
        if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
            debug!("Using static access token");
            return Ok(Self::Static(token.to_string()));
        }

        match &config.credentials_path {
            Some(path) => Self::service_account(path).await,
            None => {
                debug!("No credentials configured, sending unauthenticated requests");
                Ok(Self::Anonymous)
            }
        }
    }

    /// Builds an authenticator from a service account key file.
    pub async fn service_account(path: &Path) -> Result<Self> {
        debug!("Loading service account key from {}", path.display());
        let key = yup_oauth2::read_service_account_key(path)
            .await
            .map_err(|e| {
                StatsError::auth(format!(
                    "Failed to read service account key {}: {e}",
                    path.display()
                ))
            })?;

        let authenticator = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| StatsError::auth(format!("Failed to build authenticator: {e}")))?;

        Ok(Self::ServiceAccount(Box::new(authenticator)))
    }

    /// Returns the bearer token to send, if any.
    pub async fn token(&self) -> Result<Option<String>> {
        match self {
            Self::Anonymous => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::ServiceAccount(authenticator) => {
                let token = authenticator.token(SCOPES).await.map_err(token_error)?;
                token
                    .token()
                    .map(|t| Some(t.to_string()))
                    .ok_or_else(|| StatsError::auth("Token response contained no access token"))
            }
        }
    }
}

/// Maps a token refresh failure to an error.
///
/// Failing to reach the token endpoint is transient like any other transport
/// failure. Rejected grants and bad keys are not.
fn token_error(error: yup_oauth2::Error) -> StatsError {
    match error {
        yup_oauth2::Error::HttpError(_) | yup_oauth2::Error::LowLevelError(_) => {
            StatsError::transport(format!("Failed to reach token endpoint: {error}"))
        }
        _ => StatsError::auth(format!("Failed to obtain access token: {error}")),
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Static(_) => f.write_str("Static(<redacted>)"),
            Self::ServiceAccount(_) => f.write_str("ServiceAccount"),
        }
    }
}
