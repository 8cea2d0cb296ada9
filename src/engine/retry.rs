use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Backoff settings for collaborator calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first call
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds (doubles each retry)
    pub initial_delay_ms: u64,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, for tests and dry runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Last error seen by [`retry_with_backoff`] and how many calls were made
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: ProviderError,
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// the attempt budget is exhausted.
///
/// Only throttling and timeouts are retried; everything else is returned
/// after the first attempt.
pub fn retry_with_backoff<T, F>(policy: &RetryPolicy, mut operation: F) -> Result<T, RetryFailure>
where
    F: FnMut() -> Result<T, ProviderError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation() {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            Err(error) => {
                return Err(RetryFailure {
                    attempts: attempt,
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_delay_ms: 100,
            max_delay_ms: 500,
        };

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(80), Duration::from_millis(500));
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let mut calls = 0;
        let result = retry_with_backoff(&RetryPolicy::immediate(3), || {
            calls += 1;
            if calls < 3 {
                Err(ProviderError::Throttled("slow down".to_string()))
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_exhausted_budget_reports_attempts() {
        let result: Result<(), _> = retry_with_backoff(&RetryPolicy::immediate(2), || {
            Err(ProviderError::Timeout("no response".to_string()))
        });

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert!(matches!(failure.error, ProviderError::Timeout(_)));
    }

    #[test]
    fn test_permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff(&RetryPolicy::immediate(5), || {
            calls += 1;
            Err(ProviderError::Unauthorized("denied".to_string()))
        });

        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().attempts, 1);
    }

    #[test]
    fn test_zero_attempts_still_calls_once() {
        let mut calls = 0;
        let _ = retry_with_backoff(&RetryPolicy::immediate(0), || {
            calls += 1;
            Ok::<_, ProviderError>(())
        });

        assert_eq!(calls, 1);
    }
}
