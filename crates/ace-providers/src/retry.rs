//! Bounded retry with exponential backoff for transient provider failures.
//!
//! Only [`ProviderError::Unavailable`] is retried. Any other failure is
//! returned to the caller immediately and unchanged. The delay before
//! retry *i* (1-based) is `initial_delay * backoff_factor^(i-1)`; there is
//! no jitter and no circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{CompletionRequest, CompletionResponse, LLMProvider, ProviderError};

/// Invalid retry policy parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryPolicyError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,

    #[error("backoff_factor must be greater than 1, got {0}")]
    FactorTooSmall(f64),
}

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Result<Self, RetryPolicyError> {
        if max_attempts == 0 {
            return Err(RetryPolicyError::NoAttempts);
        }
        if !(backoff_factor > 1.0) || !backoff_factor.is_finite() {
            return Err(RetryPolicyError::FactorTooSmall(backoff_factor));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_factor,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, waiting 2s then 4s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

/// Retry state: attempts made so far and the wait before the next one.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_attempts: u32,
    backoff_factor: f64,
    attempts: u32,
    next_delay: Duration,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            backoff_factor: policy.backoff_factor,
            attempts: 0,
            next_delay: policy.initial_delay,
        }
    }

    /// Start an attempt, returning its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a transient failure of the current attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` when
    /// the attempt budget is spent.
    pub fn on_transient_failure(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let delay = self.next_delay;
        self.next_delay = scale_saturating(delay, self.backoff_factor);
        Some(delay)
    }
}

/// `delay * factor`, clamped to [`Duration::MAX`] instead of overflowing.
fn scale_saturating(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Failure of a resilient invocation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    #[error(transparent)]
    NonTransient(ProviderError),

    #[error("Model still unavailable after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: ProviderError },
}

/// Calls a provider, retrying transient overload per a [`RetryPolicy`].
///
/// Backoff sleeps suspend only the calling task.
pub struct ResilientInvoker {
    provider: Arc<dyn LLMProvider>,
    policy: RetryPolicy,
}

impl ResilientInvoker {
    pub fn new(provider: Arc<dyn LLMProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub async fn invoke(&self, request: &CompletionRequest) -> Result<CompletionResponse, InvokeError> {
        let mut backoff = Backoff::new(&self.policy);

        loop {
            let attempt = backoff.begin_attempt();
            debug!(
                provider = self.provider.name(),
                model = self.provider.model(),
                attempt,
                "Invoking model"
            );

            let error = match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(InvokeError::NonTransient(e)),
            };

            match backoff.on_transient_failure() {
                Some(delay) => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Model overloaded, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(attempts = attempt, error = %error, "Model overloaded, giving up");
                    return Err(InvokeError::RetryExhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
            }
        }
    }
}
