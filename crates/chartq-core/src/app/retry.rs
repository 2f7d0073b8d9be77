//! Backoff for transient store / queue failures.
//!
//! ジョブそのものの失敗はリトライしません（failed として記録する）。
//! リトライするのはストア・キューに届かないときだけです。

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::RetryConfig;
use crate::domain::{QueueError, StoreError};

/// Exponential backoff: `base_delay * multiplier^(attempts - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl Backoff {
    /// Delay before the next attempt, given how many attempts already failed (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Errors that may clear up on their own.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl Transient for QueueError {
    fn is_transient(&self) -> bool {
        true
    }
}

/// Sleep for `delay` unless shutdown is requested first.
///
/// Returns `false` when the caller should stop.
pub(crate) async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        changed = shutdown.changed() => {
            if changed.is_err() {
                return false;
            }
        }
    }
    !*shutdown.borrow()
}

/// Run `op` until it succeeds or fails with a non-transient error.
///
/// Returns `None` if shutdown was requested while backing off.
pub(crate) async fn retry_transient<T, E, F, Fut>(
    backoff: &Backoff,
    shutdown: &mut watch::Receiver<bool>,
    step: &str,
    mut op: F,
) -> Option<Result<T, E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + fmt::Display,
{
    let mut attempts = 0u32;
    loop {
        match op().await {
            Err(err) if err.is_transient() => {
                attempts += 1;
                let delay = backoff.next_delay(attempts);
                tracing::warn!(
                    step,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                if !pause(delay, shutdown).await {
                    return None;
                }
            }
            other => return Some(other),
        }
    }
}
