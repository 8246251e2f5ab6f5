//! Retry policy for transient service failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default delay between job status polls and between retries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Attempts allowed for submitting a query.
pub const SUBMIT_MAX_ATTEMPTS: u32 = 5;

/// First retry delay for submitting a query, doubled on each failure.
pub const SUBMIT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How the retry delay grows with consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Always wait the poll interval.
    #[default]
    None,
    /// Wait `interval * n` after the n-th consecutive failure.
    Linear,
    /// Wait `interval * 2^(n-1)` after the n-th consecutive failure.
    Exponential,
}

impl Backoff {
    /// Returns the backoff as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
        }
    }
}

impl fmt::Display for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Backoff {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "fixed" => Ok(Self::None),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            _ => Err(format!(
                "Invalid backoff: {s}. Expected: none, linear, or exponential"
            )),
        }
    }
}

/// Controls how the runner waits and retries.
///
/// The default retries forever at a fixed 5 second cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Give up after this many consecutive transient failures of one step.
    pub max_attempts: Option<u32>,
    /// Delay between job status polls, and the base retry delay.
    pub poll_interval: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    /// Unbounded retries at a fixed interval.
    pub fn fixed(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Self::default()
        }
    }

    /// Bounded exponential retries used for query submission.
    pub fn submission() -> Self {
        Self::fixed(SUBMIT_BASE_DELAY)
            .with_max_attempts(SUBMIT_MAX_ATTEMPTS)
            .with_backoff(Backoff::Exponential)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns true once `failures` consecutive failures use up the budget.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }

    /// Delay to wait after the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let n = failures.max(1);
        match self.backoff {
            Backoff::None => self.poll_interval,
            Backoff::Linear => self.poll_interval.saturating_mul(n),
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(n - 1).unwrap_or(u32::MAX);
                self.poll_interval.saturating_mul(factor)
            }
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {:?}, {} backoff, ", self.poll_interval, self.backoff)?;
        match self.max_attempts {
            Some(max) => write!(f, "at most {max} attempts"),
            None => f.write_str("unbounded attempts"),
        }
    }
}
