//! Retry policy shared by the embedding upsert path and the completion path.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial * factor^(retry - 1)`
    Exponential { factor: f64 },
    /// `initial * retry`
    Linear,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff: Backoff,
    retryable: fn(&ApiError) -> bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff,
            retryable: ApiError::is_rate_limited,
        }
    }

    /// Vector upserts: 5 retries, 1s doubling.
    pub fn embedding() -> Self {
        Self::new(5, Duration::from_secs(1), Backoff::Exponential { factor: 2.0 })
    }

    /// Completions: 3 retries, 30s linear steps.
    pub fn completion() -> Self {
        Self::new(3, Duration::from_secs(30), Backoff::Linear)
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Backoff::Linear)
    }

    pub fn with_predicate(mut self, retryable: fn(&ApiError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Exponential { factor } => {
                let scale = factor.powi(retry.saturating_sub(1) as i32);
                self.initial_delay.mul_f64(scale)
            }
            Backoff::Linear => self.initial_delay * retry,
        }
    }

    /// Upper bound of the time spent sleeping when every retry is consumed.
    pub fn total_delay(&self) -> Duration {
        (1..=self.max_retries).map(|retry| self.delay_for(retry)).sum()
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!("{} succeeded after {} retries", label, retry);
                    }
                    return Ok(value);
                }
                Err(err) if (self.retryable)(&err) && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        label, err, retry, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_schedules() {
        let embedding = RetryPolicy::embedding();
        let delays: Vec<u64> = (1..=5).map(|n| embedding.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);

        let completion = RetryPolicy::completion();
        let delays: Vec<u64> = (1..=3).map(|n| completion.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![30, 60, 90]);
    }

    #[tokio::test(start_paused = true)]
    async fn embedding_rate_limit_resolves_within_bound() {
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = RetryPolicy::embedding()
            .run("add_documents", || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 5 {
                    Err(ApiError::RateLimited("429".into()))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 5);
        assert!(started.elapsed() <= Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_gives_up_after_three_retries() {
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<(), ApiError> = RetryPolicy::completion()
            .run("completion", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::RateLimited("429".into()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::RateLimited(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), ApiError> = RetryPolicy::embedding()
            .run("add_documents", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Upstream("boom".into()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::Upstream(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
