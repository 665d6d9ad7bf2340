//! Retry policy for failed publish attempts
//!
//! Attempts are counted from 1. A job whose attempt `n` failed transiently is
//! retried while `n <= max_retries`, so a job makes at most `max_retries + 1`
//! attempts. The worker pool turns a [`RetryDecision::Retry`] into a delayed
//! requeue; [`RetryPolicy::execute`] is the in-process variant that sleeps.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::error::{CrosspostError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_secs(config.initial_delay_secs),
            multiplier: config.multiplier,
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }

    /// Policy with no waiting between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// What to do after attempt `attempt` failed with `error`
    pub fn decide(&self, attempt: u32, error: &CrosspostError) -> RetryDecision {
        if error.is_transient() && attempt <= self.max_retries {
            RetryDecision::Retry {
                delay: self.delay_for(attempt),
            }
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Run `operation` until it succeeds or the policy gives up
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => match self.decide(attempt, &e) {
                    RetryDecision::Retry { delay } => {
                        warn!(
                            "Transient error in {} (attempt {}/{}): {}. Retrying in {:?}...",
                            label,
                            attempt,
                            self.max_retries + 1,
                            e,
                            delay
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        if e.is_transient() {
                            warn!("{} failed after {} attempts: {}", label, attempt, e);
                        }
                        return Err(e);
                    }
                },
            }
        }
    }
}
