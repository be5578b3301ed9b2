//! Automatic retry with exponential backoff and jitter.
//!
//! Retries [`ProviderError::Transient`] failures (429, 408, 5xx, network
//! timeouts, dropped connections). Terminal failures such as 400 or 401 are
//! returned on the first attempt.

use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff timing for retried model calls.
///
/// The retry *count* is a per-request generation option
/// ([`GenerationOptions::max_retries`](crate::agent::config::GenerationOptions)),
/// so a single client can serve calls with different budgets.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A config with no waiting between attempts. Useful for tests.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter && capped > 0.0 {
            // "Equal jitter": keep half the delay, randomise the other half.
            use rand::Rng;
            let jittered = rand::rng().random_range(capped / 2.0..=capped);
            Duration::from_secs_f64(jittered)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Drive `call` until it succeeds, fails terminally, or `max_retries` retries
/// have been spent.
///
/// When the budget runs out the last transient failure is surfaced as
/// [`ProviderError::Terminal`] so callers never have to retry again.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    max_retries: u32,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(ProviderError::Transient(msg)) => {
                if attempt >= max_retries {
                    return Err(ProviderError::Terminal(format!(
                        "gave up after {} attempt(s): {msg}",
                        attempt + 1
                    )));
                }
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient provider error (attempt {}/{}): {msg}. Retrying in {delay:?}...",
                    attempt + 1,
                    max_retries + 1,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(terminal) => return Err(terminal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..Default::default()
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);

        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..Default::default()
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
        assert!(config.delay_for_attempt(u32::MAX) <= Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_within_half_to_full_delay() {
        let jittered = RetryConfig::default();
        let plain = RetryConfig {
            jitter: false,
            ..Default::default()
        };
        let full = plain.delay_for_attempt(2);
        let delays: Vec<Duration> = (0..64).map(|_| jittered.delay_for_attempt(2)).collect();
        for d in &delays {
            assert!(*d <= full, "{d:?} > {full:?}");
            assert!(*d >= full / 2, "{d:?} < half of {full:?}");
        }
        // Concurrent callers must not all wait the same amount.
        assert!(delays.iter().any(|d| *d != delays[0]));
    }

    #[test]
    fn immediate_has_no_jitter() {
        let config = RetryConfig::immediate();
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(5), Duration::ZERO);
    }

    #[tokio::test]
    async fn transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&RetryConfig::immediate(), 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Transient("HTTP 503".into()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&RetryConfig::immediate(), 5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Terminal("HTTP 401".into())) }
        })
        .await;
        assert_eq!(result, Err(ProviderError::Terminal("HTTP 401".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_become_terminal() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&RetryConfig::immediate(), 2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Transient("HTTP 429: slow down".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ProviderError::Terminal(msg)) => {
                assert!(msg.contains("3 attempt"), "{msg}");
                assert!(msg.contains("429"), "{msg}");
            }
            other => panic!("expected terminal error, got {other:?}"),
        }
    }
}
