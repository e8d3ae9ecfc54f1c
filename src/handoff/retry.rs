//! Retry policy and the timer it waits on

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many times a handoff is attempted and how long to wait in between
///
/// `max_retries` is the total number of attempts; zero still makes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// `base * 2^(n-1)` when true, `base * n` when false
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(100))
    }
}

impl RetryPolicy {
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            exponential: true,
        }
    }

    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            exponential: false,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Wait after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let factor = if self.exponential {
            2u32.saturating_pow(attempt - 1)
        } else {
            attempt
        };
        self.base_delay.saturating_mul(factor)
    }
}

/// Timer used between attempts
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Sleeps on the tokio timer (virtual under `tokio::time::pause`)
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
