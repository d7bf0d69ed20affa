//! Exponential backoff with jitter
//!
//! The delay before retry `n` (1-based) is
//!
//! ```text
//! min(base * 2^(n-1), max) * uniform(1 - jitter, 1 + jitter)
//! ```
//!
//! clamped again to `max` after jitter. With the defaults (1s base, 30s cap,
//! 25% jitter) the first retry waits 0.75..1.25s and the second 1.5..2.5s.

use qsbackup_core::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Retry budget and delay shape for one retrying unit
///
/// Each bundle and identity category owns its own attempt counter; a policy
/// only describes the shape and carries no state.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: jitter.clamp(0.0, 0.99),
        }
    }

    /// A policy that never sleeps, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO, 0.0)
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempts_made`
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay before retry `retry` without jitter
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry `retry` with jitter applied
    pub fn delay(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);
        if self.jitter == 0.0 || nominal.is_zero() {
            return nominal;
        }
        let scale = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        nominal.mul_f64(scale).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(
            config.max_attempts,
            config.base_delay,
            config.max_delay,
            config.jitter,
        )
    }
}
