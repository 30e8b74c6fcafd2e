//! Retry with capped exponential backoff and optional jitter.
//!
//! Used by the poll executor to retry vendor requests that time out.
//! Callers decide which errors are retryable; everything else fails fast.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter.
    None,
    /// delay + random(0..=delay)
    #[default]
    Additive,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Base delay between retries in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter_strategy: JitterStrategy,
}

fn default_max_attempts() -> usize {
    7
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_strategy: JitterStrategy::Additive,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// State tracking for one retried operation.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Index of the attempt that last ran (0-indexed).
    pub attempt: usize,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates the delay after the current attempt failed.
    #[must_use]
    pub fn calculate_delay(&self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let attempt = u32::try_from(self.attempt).unwrap_or(u32::MAX);

        let delay = base.saturating_mul(2u64.saturating_pow(attempt)).min(max);

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Additive => {
                delay.saturating_add(rand::thread_rng().gen_range(0..=delay))
            }
        };

        Duration::from_millis(jittered.min(max))
    }

    /// Returns true if no attempts remain after the current one.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt + 1 >= config.max_attempts
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Decides what to do after the current attempt failed, advancing the state
/// when a retry is granted.
#[must_use]
pub fn should_retry(state: &mut RetryState, config: &RetryConfig, retryable: bool) -> RetryDecision {
    if !retryable {
        return RetryDecision::NotRetryable;
    }
    if state.is_exhausted(config) {
        return RetryDecision::GiveUp;
    }

    let delay = state.calculate_delay(config);
    state.attempt += 1;

    RetryDecision::Retry(delay)
}

/// Executes an operation with retry logic.
///
/// The operation receives the 0-indexed attempt number so it can rebuild its
/// request between attempts.
pub async fn with_retry<T, E, F, Fut, P>(
    config: &RetryConfig,
    key: &str,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut state = RetryState::new();

    loop {
        match operation(state.attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => match should_retry(&mut state, config, is_retryable(&e)) {
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        key,
                        attempt = state.attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    tracing::error!(
                        key,
                        attempts = state.attempt + 1,
                        error = %e,
                        "Giving up after max attempts"
                    );
                    return Err(e);
                }
                RetryDecision::NotRetryable => return Err(e),
            },
        }
    }
}
