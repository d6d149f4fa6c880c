// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Retry schedules for batch delivery

use std::future::Future;
use std::time::Duration;

/// How often and how long to wait before re-sending a failed batch
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RetryStrategy {
    /// No retries
    #[default]
    None,
    /// Fixed number of retries with constant delay
    Fixed {
        /// Maximum number of retry attempts
        max_retries: u32,
        /// Delay between retries
        delay: Duration,
    },
    /// Exponential backoff
    ExponentialBackoff {
        /// Maximum number of retry attempts
        max_retries: u32,
        /// Delay before the first retry
        initial_delay: Duration,
        /// Upper bound on any single delay
        max_delay: Duration,
        /// Multiplier for each attempt
        multiplier: f64,
    },
}

impl RetryStrategy {
    /// Delay before retry number `attempt` (0-indexed)
    ///
    /// Returns None once the retry budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries() {
            return None;
        }
        match self {
            Self::None => None,
            Self::Fixed { delay, .. } => Some(*delay),
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let delay_ms = initial_delay.as_millis() as f64 * multiplier.powi(attempt as i32);
                Some(Duration::from_millis(delay_ms as u64).min(*max_delay))
            }
        }
    }

    /// Maximum number of retries
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Fixed { max_retries, .. } | Self::ExponentialBackoff { max_retries, .. } => {
                *max_retries
            }
        }
    }

    /// Create a fixed retry strategy
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::Fixed { max_retries, delay }
    }

    /// Create an exponential backoff strategy doubling from `initial_delay`, capped at 30 s
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        Self::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Outcome of a retried operation
#[derive(Debug)]
pub struct Attempts<T, E> {
    /// Final result
    pub result: Result<T, E>,
    /// Number of attempts made, including the first
    pub attempts: u32,
}

/// Run `operation` until it succeeds or `strategy` gives up
///
/// `should_retry` decides whether an error is worth another attempt.
pub async fn retry_async<T, E, F, Fut, P>(
    strategy: &RetryStrategy,
    should_retry: P,
    mut operation: F,
) -> Attempts<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                return Attempts {
                    result: Ok(value),
                    attempts: attempt + 1,
                }
            }
            Err(err) => match strategy.delay_for_attempt(attempt) {
                Some(delay) if should_retry(&err) => {
                    tracing::debug!(attempt, ?delay, "retrying after failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => {
                    return Attempts {
                        result: Err(err),
                        attempts: attempt + 1,
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_none_never_retries() {
        assert_eq!(RetryStrategy::None.delay_for_attempt(0), None);
        assert_eq!(RetryStrategy::None.max_retries(), 0);
    }

    #[test]
    fn test_fixed_delays() {
        let strategy = RetryStrategy::fixed(2, Duration::from_millis(50));
        assert_eq!(strategy.delay_for_attempt(0), Some(Duration::from_millis(50)));
        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::from_millis(50)));
        assert_eq!(strategy.delay_for_attempt(2), None);
    }

    #[test]
    fn test_exponential_delays_capped() {
        let strategy = RetryStrategy::ExponentialBackoff {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(strategy.delay_for_attempt(0), Some(Duration::from_millis(100)));
        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::from_millis(200)));
        assert_eq!(strategy.delay_for_attempt(2), Some(Duration::from_millis(400)));
        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_millis(500)));
        assert_eq!(strategy.delay_for_attempt(5), None);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let strategy = RetryStrategy::fixed(3, Duration::from_millis(1));
        let outcome = retry_async(&strategy, |_: &&str| true, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("down")
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(outcome.result, Ok(7));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_respects_predicate() {
        let strategy = RetryStrategy::fixed(3, Duration::from_millis(1));
        let outcome: Attempts<(), &str> =
            retry_async(&strategy, |_| false, || async { Err("fatal") }).await;
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.result.is_err());
    }
}
