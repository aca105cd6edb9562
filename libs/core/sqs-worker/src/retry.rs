//! Retry policy for handler invocations.
//!
//! A message is attempted at most `1 + max_retry_attempts` times. Between
//! attempts the policy sleeps; the default policy is exponential backoff with
//! jitter, a fixed delay is the simple alternative. The last error is always
//! rethrown, never swallowed.

use crate::config::ListenerConfig;
use crate::error::WorkerError;
use std::time::Duration;
use tracing::warn;

/// Cap for the exponential backoff delay.
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Upper bound of the random jitter added to each exponential delay.
const JITTER_RANGE_MS: u64 = 1000;

/// Delay strategy between handler attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// `min(base_delay * 2^attempt + jitter(0..=1000ms), max_delay)`.
    ExponentialBackoff { base_delay_ms: u64, max_delay_ms: u64 },

    /// The same delay before every retry.
    FixedDelay { delay_ms: u64 },
}

impl RetryPolicy {
    /// The default policy for a listener: exponential backoff seeded with the
    /// listener's `retry_delay_ms`.
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::ExponentialBackoff {
            base_delay_ms: config.retry_delay_ms,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }

    /// Delay to sleep after the failure of attempt `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::FixedDelay { delay_ms } => Duration::from_millis(*delay_ms),
            Self::ExponentialBackoff {
                base_delay_ms,
                max_delay_ms,
            } => {
                let exp_delay = base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt))
                    .saturating_add(jitter_ms());
                Duration::from_millis(exp_delay.min(*max_delay_ms))
            }
        }
    }

    /// Run `op` until it succeeds or `max_retry_attempts` additional attempts
    /// have been made (at most `1 + max_retry_attempts` total).
    ///
    /// Returns the final result together with the number of retries that were
    /// performed; the last error is rethrown unchanged.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        max_retry_attempts: u32,
        mut op: F,
    ) -> (Result<T, WorkerError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WorkerError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return (Ok(value), attempt),
                Err(error) => {
                    if attempt >= max_retry_attempts {
                        return (Err(error), attempt);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = max_retry_attempts + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "attempt failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Pseudo-random jitter in `0..=JITTER_RANGE_MS`, derived from the clock.
///
/// Spreads concurrent retries without pulling in an RNG dependency.
fn jitter_ms() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::SystemTime;

    let mut hasher = DefaultHasher::new();
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    hasher.finish() % (JITTER_RANGE_MS + 1)
}
