//! Composed resilience policy.
//!
//! Fixed order, outermost first: retry → circuit breaker → timeout.
//! The breaker sees attempt timeouts as failures; the retry loop sees breaker
//! rejections and stops instead of hammering an open circuit.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::ResilienceConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::resilience::retries::Transient;
use crate::resilience::timeouts::Deadline;

/// Immutable per-call policy parameters, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyContext {
    pub attempt_timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl From<&ResilienceConfig> for PolicyContext {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
            breaker_threshold: config.breaker_threshold,
            breaker_cooldown: Duration::from_millis(config.breaker_cooldown_ms),
        }
    }
}

impl Default for PolicyContext {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl PolicyContext {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        calculate_backoff(retry, self.base_delay, self.max_delay, self.jitter)
    }
}

/// Failure produced by the pipeline itself, or the inner call's error.
#[derive(Debug)]
pub enum PolicyError<E> {
    /// A single attempt exceeded the per-attempt timeout.
    Timeout(Duration),
    /// The overall call deadline ran out.
    DeadlineExceeded(Duration),
    /// The breaker rejected the call without dispatching it.
    CircuitOpen { retry_after: Duration },
    /// The inner call failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for PolicyError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::Timeout(after) => write!(f, "attempt timed out after {:?}", after),
            PolicyError::DeadlineExceeded(after) => {
                write!(f, "call deadline of {:?} exceeded", after)
            }
            PolicyError::CircuitOpen { retry_after } => {
                write!(f, "circuit open, retry after {:?}", retry_after)
            }
            PolicyError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PolicyError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PolicyError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Retry, breaker and timeout policies applied around one outbound call.
#[derive(Debug)]
pub struct ResiliencePipeline {
    policy: Arc<PolicyContext>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl ResiliencePipeline {
    pub fn new(policy: Arc<PolicyContext>) -> Self {
        Self {
            policy,
            breakers: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &PolicyContext {
        &self.policy
    }

    /// Breaker guarding `key`, created closed on first use.
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(key) {
            return breaker.clone();
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    key,
                    self.policy.breaker_threshold,
                    self.policy.breaker_cooldown,
                ))
            })
            .clone()
    }

    pub fn circuit_state(&self, key: &str) -> Option<CircuitState> {
        self.breakers.get(key).map(|b| b.state())
    }

    /// Every known breaker and its state, sorted by key.
    pub fn circuit_states(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<_> = self
            .breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Run `call` under the composed policy.
    ///
    /// `call` receives the 1-based attempt number. A transient response that
    /// survives every retry is returned as `Ok` so the caller can classify it.
    pub async fn execute<T, E, F, Fut>(
        &self,
        key: &str,
        deadline: Deadline,
        mut call: F,
    ) -> Result<T, PolicyError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Transient,
        E: Transient + fmt::Display,
    {
        let breaker = self.breaker(key);
        let deadline_limit = deadline.limit().unwrap_or_default();
        let mut retry = 0u32;

        loop {
            let attempt = retry + 1;

            let Some(budget) = deadline.attempt_budget(self.policy.attempt_timeout) else {
                return Err(PolicyError::DeadlineExceeded(deadline_limit));
            };

            let permit = match breaker.try_acquire() {
                Ok(permit) => permit,
                Err(retry_after) => {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        retry_after = ?retry_after,
                        "Circuit open, failing fast"
                    );
                    metrics::record_circuit_rejection(key);
                    return Err(PolicyError::CircuitOpen { retry_after });
                }
            };

            let last = match tokio::time::timeout(budget.limit, call(attempt)).await {
                Ok(Ok(value)) if value.is_transient() => {
                    permit.failure();
                    metrics::record_attempt("transient_response");
                    Ok(value)
                }
                Ok(Ok(value)) => {
                    permit.success();
                    metrics::record_attempt("success");
                    return Ok(value);
                }
                Ok(Err(e)) if e.is_transient() => {
                    permit.failure();
                    metrics::record_attempt("transient_error");
                    tracing::debug!(key = %key, attempt, error = %e, "Attempt failed");
                    Err(PolicyError::Inner(e))
                }
                Ok(Err(e)) => {
                    // Non-transient errors do not count against the breaker.
                    permit.success();
                    metrics::record_attempt("error");
                    return Err(PolicyError::Inner(e));
                }
                Err(_) => {
                    permit.failure();
                    metrics::record_attempt("timeout");
                    if budget.deadline_bound {
                        return Err(PolicyError::DeadlineExceeded(deadline_limit));
                    }
                    Err(PolicyError::Timeout(budget.limit))
                }
            };

            if retry >= self.policy.max_retries {
                tracing::warn!(key = %key, attempts = attempt, "Retries exhausted");
                return last;
            }

            retry += 1;
            let delay = self.policy.backoff(retry);
            if !deadline.allows(delay) {
                tracing::warn!(
                    key = %key,
                    attempt,
                    delay = ?delay,
                    "Deadline leaves no room for another retry"
                );
                return Err(PolicyError::DeadlineExceeded(deadline_limit));
            }

            tracing::warn!(key = %key, retry, delay_ms = delay.as_millis() as u64, "Retrying call");
            metrics::record_retry(key);
            tokio::time::sleep(delay).await;
        }
    }
}
