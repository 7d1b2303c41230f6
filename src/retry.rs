//! Retry policy with backoff for transient step failures

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff shape between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Retry configuration, as it appears in `config.yaml`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt.
    pub max_retries: usize,
    pub backoff: BackoffKind,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f32,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffKind::Exponential,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Computes the delay before a given retry attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> usize {
        self.config.max_retries
    }

    /// Delay before retry `attempt` (0-based). Jitter, when enabled, adds up
    /// to 30% on top of the base delay.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let initial = Duration::from_millis(self.config.initial_delay_ms);
        let max = Duration::from_millis(self.config.max_delay_ms);
        let base = match self.config.backoff {
            BackoffKind::Fixed => initial,
            BackoffKind::Exponential => {
                let mult = self.config.backoff_multiplier.powi(attempt as i32);
                let d = initial.mul_f32(mult);
                if d > max {
                    max
                } else {
                    d
                }
            }
        };
        if self.config.jitter {
            let frac: f64 = rand::thread_rng().gen_range(0.0..0.3);
            base + Duration::from_millis((base.as_millis() as f64 * frac) as u64)
        } else {
            base
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
