//! Retry and backoff policy
//!
//! Every network-observable step runs through [`RetryPolicy::run`]. Failures
//! are classified once, at this layer:
//!
//! | Condition | Class | Action |
//! |-----------|-------|--------|
//! | HTTP 429 | RateLimited | Retry, backoff multiplied |
//! | HTTP 5xx | Transient | Retry with exponential backoff |
//! | Timeout / connection failure / content not ready | Transient | Retry |
//! | Other HTTP 4xx | Permanent | Propagate immediately |
//! | Malformed response / other | Permanent | Propagate immediately |
//!
//! A server-supplied `Retry-After` is honoured by never sleeping less than it
//! asks for, up to the rate-limited ceiling (`max_delay × multiplier`).

use crate::config::RetryConfig;
use crate::report::FailureReport;
use crate::transport::TransportError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    RateLimited,
    Permanent,
}

impl FailureClass {
    /// Classifies a transport failure
    pub fn of(error: &TransportError) -> Self {
        match error {
            TransportError::Http { status: 429, .. } => Self::RateLimited,
            TransportError::Http { status, .. } if *status >= 500 => Self::Transient,
            TransportError::Http { .. } => Self::Permanent,
            TransportError::Timeout(_)
            | TransportError::Connection(_)
            | TransportError::ContentNotReady { .. } => Self::Transient,
            TransportError::Malformed(_) | TransportError::Other(_) => Self::Permanent,
        }
    }

    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

/// Terminal outcome of a retried step
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransportError },

    #[error("permanent failure: {0}")]
    Permanent(TransportError),
}

/// Bounded exponential backoff with a rate-limit multiplier
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    rate_limit_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            rate_limit_multiplier: config.rate_limit_multiplier.max(1.0),
        }
    }

    /// Attempts allowed per step, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(
        &self,
        attempt: u32,
        class: FailureClass,
        retry_after: Option<Duration>,
    ) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        let ceiling = self.ceiling();
        let delay = match class {
            FailureClass::RateLimited => scale(backoff, self.rate_limit_multiplier).min(ceiling),
            FailureClass::Transient | FailureClass::Permanent => backoff,
        };

        match retry_after {
            Some(requested) => delay.max(requested.min(ceiling)),
            None => delay,
        }
    }

    /// Longest single pause, whatever the server asks for
    pub fn ceiling(&self) -> Duration {
        scale(self.max_delay, self.rate_limit_multiplier)
    }

    /// Runs `op` until it succeeds, fails permanently, or `budget` attempts
    /// have been made
    ///
    /// Every failed attempt is turned into a [`FailureReport`], logged, and
    /// appended to `failures`.
    pub async fn run<T, F, Fut>(
        &self,
        url: &Url,
        budget: u32,
        failures: &mut Vec<FailureReport>,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let budget = budget.max(1);
        let mut attempt = 1;

        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let report = FailureReport::from_transport_error(url, &error);
            tracing::error!("{}", report);
            failures.push(report);

            let class = FailureClass::of(&error);
            if !class.is_retryable() {
                return Err(RetryError::Permanent(error));
            }
            if attempt >= budget {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay_for(attempt, class, error.retry_after());
            tracing::debug!(
                "Retrying {} in {:?} (attempt {}/{}, {:?})",
                url,
                delay,
                attempt + 1,
                budget,
                class
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
