//! Bounded retry with exponential backoff for store writes.

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Kind of write being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    Add,
    Edit,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Edit => "edit",
            Self::Delete => "delete",
        })
    }
}

/// Attempt budget and backoff base. The wait before retry `i` (0-indexed) is
/// `base_delay * 2^i`; there is no wait after the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn delay_before_retry(&self, retry_index: u32) -> Duration {
        let factor = 1_u32.checked_shl(retry_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Every attempt failed; carries the last error seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure<E> {
    pub operation: WriteOp,
    pub attempts: u32,
    pub last_error: E,
}

/// Run `attempt` until it succeeds or the policy's attempt budget is spent.
///
/// `attempt` receives the 0-based attempt index and must issue a complete,
/// independent request each time.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: WriteOp,
    mut attempt: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut index = 0;

    loop {
        match attempt(index).await {
            Ok(value) => {
                if index > 0 {
                    tracing::info!("{} succeeded on attempt {}", operation, index + 1);
                }
                return Ok(value);
            }
            Err(error) => {
                let attempts = index + 1;
                if attempts >= max_attempts {
                    tracing::error!(
                        "{} failed after {} attempt(s): {}",
                        operation,
                        attempts,
                        error
                    );
                    return Err(RetryFailure {
                        operation,
                        attempts,
                        last_error: error,
                    });
                }

                let delay = policy.delay_before_retry(index);
                tracing::warn!(
                    "{} attempt {} failed: {}; retrying in {:?}",
                    operation,
                    attempts,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
                index += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn default_delays_double_from_one_second() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5)
            .map(|index| policy.delay_before_retry(index).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn huge_retry_index_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_before_retry(64),
            Duration::from_secs(u64::from(u32::MAX))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_fifth_attempt_after_fifteen_seconds() {
        let start = Instant::now();
        let mut calls = 0_u32;

        let result = run_with_retry(&RetryPolicy::default(), WriteOp::Add, |index| {
            calls += 1;
            async move {
                if index < 4 {
                    Err(format!("transient {index}"))
                } else {
                    Ok(index)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(4));
        assert_eq!(calls, 5);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_makes_exactly_five_attempts() {
        let start = Instant::now();
        let mut calls = 0_u32;

        let result: Result<(), _> =
            run_with_retry(&RetryPolicy::default(), WriteOp::Delete, |index| {
                calls += 1;
                async move { Err(format!("failure {index}")) }
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(calls, 5);
        assert_eq!(failure.attempts, 5);
        assert_eq!(failure.operation, WriteOp::Delete);
        assert_eq!(failure.last_error, "failure 4");
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_wait() {
        let start = Instant::now();
        let result = run_with_retry(&RetryPolicy::default(), WriteOp::Edit, |_| async {
            Ok::<_, String>("done")
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempt_budget_still_tries_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            base_delay: Duration::from_secs(1),
        };
        let mut calls = 0_u32;
        let result: Result<(), _> = run_with_retry(&policy, WriteOp::Add, |_| {
            calls += 1;
            async { Err("down") }
        })
        .await;
        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().attempts, 1);
    }
}
