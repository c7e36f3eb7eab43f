//! # Retry Module / 重试模块
//!
//! Exponential backoff for network-bound steps (runtime provisioning and
//! toolchain fetches). Every error is treated as transient; the number of
//! attempts bounds the cost of a permanent failure.
//!
//! 针对网络相关步骤（运行时准备与工具链获取）的指数退避重试。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// How many times a step is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): doubles each time, capped.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Runs `operation` until it succeeds or the policy's attempts are exhausted.
/// The closure receives the 1-based attempt number. The last error is returned.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, step: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                let backoff = policy.backoff_for(attempt);
                debug!(
                    step = step,
                    attempt = attempt,
                    max_attempts = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "retrying step"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                if attempts > 1 {
                    warn!(step = step, attempts = attempts, "all attempts failed");
                }
                return Err(e);
            }
        }
    }
}
