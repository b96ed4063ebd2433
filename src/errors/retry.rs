use std::future::Future;
use std::time::Duration;

use super::types::ConductorError;
use tracing::warn;

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to 10% random jitter on top of each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-indexed):
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        let exp = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if !self.jitter || exp.is_zero() {
            return exp;
        }
        let jitter = exp.mul_f64(rand::random::<f64>() * 0.1);
        (exp + jitter).min(self.max_delay)
    }
}

/// Final result of a retried operation plus the number of invocations made.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ConductorError>,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    pub fn into_result(self) -> Result<T, ConductorError> {
        self.result
    }
}

/// Execute an async operation, retrying only errors classified as retryable
/// until `policy.max_attempts` invocations have been made.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut factory: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ConductorError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match factory(attempt).await {
            Ok(value) => return RetryOutcome { result: Ok(value), attempts: attempt },
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable {
                    warn!(
                        operation = operation_name,
                        error_type = classification.error_type,
                        "Non-retryable error, failing immediately"
                    );
                    return RetryOutcome { result: Err(e), attempts: attempt };
                }
                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt,
                        max = max_attempts,
                        "Max retries exhausted"
                    );
                    return RetryOutcome { result: Err(e), attempts: attempt };
                }

                let delay = policy.delay_for(attempt - 1);
                warn!(
                    operation = operation_name,
                    attempt,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
