//! Retry With Budget - Bounded Attempts for Fallible Async Operations
//!
//! Used by the feed pipelines to open queue connections. Each `run` call
//! gets its own budget; nothing carries over between calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;

/// Longest wait between two attempts, whatever the backoff.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// The budget ran out. Carries the last error seen.
#[derive(Debug)]
pub struct RetryExhausted<E> {
  pub attempts: u32,
  pub last_error: E,
}

/// Attempt budget with a fixed or multiplicative delay between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  max_attempts: u32,
  delay: Duration,
  backoff_multiplier: f64,
}

impl RetryPolicy {
  /// Fixed-delay policy. A zero delay retries immediately.
  pub fn new(max_attempts: u32, delay: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      delay,
      backoff_multiplier: 1.0,
    }
  }

  /// Multiply the delay by `multiplier` after each failed attempt.
  pub fn with_backoff(mut self, multiplier: f64) -> Self {
    self.backoff_multiplier = multiplier.max(1.0);
    self
  }

  pub fn max_attempts(&self) -> u32 {
    self.max_attempts
  }

  /// Delay before attempt `attempt + 1`, given `attempt` failures so far.
  /// Saturates at `MAX_RETRY_DELAY`.
  pub fn delay_after(&self, attempt: u32) -> Duration {
    if self.delay.is_zero() {
      return Duration::ZERO;
    }
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let secs = self.delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
    Duration::try_from_secs_f64(secs)
      .unwrap_or(MAX_RETRY_DELAY)
      .min(MAX_RETRY_DELAY)
  }

  /// Run `op` until it succeeds or the budget is spent.
  ///
  /// `op` receives the 1-based attempt number. No delay follows the final
  /// attempt.
  pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted<E>>
  where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let mut attempt = 0;
    loop {
      attempt += 1;
      match op(attempt).await {
        Ok(value) => return Ok(value),
        Err(e) if attempt >= self.max_attempts => {
          return Err(RetryExhausted {
            attempts: attempt,
            last_error: e,
          });
        }
        Err(e) => {
          let wait = self.delay_after(attempt);
          warn!(
            target_op = label,
            attempt,
            max_attempts = self.max_attempts,
            wait_ms = wait.as_millis() as u64,
            error = %e,
            "Attempt failed, retrying"
          );
          if !wait.is_zero() {
            tokio::time::sleep(wait).await;
          }
        }
      }
    }
  }
}

impl From<&RetryConfig> for RetryPolicy {
  fn from(config: &RetryConfig) -> Self {
    RetryPolicy::new(config.max_attempts, Duration::from_millis(config.delay_ms))
      .with_backoff(config.backoff_multiplier)
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    RetryPolicy::from(&RetryConfig::default())
  }
}
