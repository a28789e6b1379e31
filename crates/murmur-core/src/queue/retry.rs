//! Retry policy: decides cooldown delays between soft-failed attempts.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a cap and optional jitter.
///
/// A zero `base_delay` disables cooldown entirely: soft-failed commands go
/// straight back to the tail of `CURRENT`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first soft failure.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any computed delay.
    pub max_delay: Duration,

    /// Relative spread in `[0.0, 1.0]`; `0.25` means ±25%.
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: Duration::from_secs(3600),
            jitter: 0.0,
        }
    }

    /// No cooldown: every retry is immediate.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1.0)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the next attempt after `attempts` soft failures (1-indexed).
    ///
    /// `base_delay * multiplier^(attempts - 1)`, capped at `max_delay`, then
    /// spread by `jitter`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let max_secs = self.max_delay.as_secs_f64();
        let mut secs = (self.base_delay.as_secs_f64() * self.multiplier.powi(exponent)).min(max_secs);

        if self.jitter > 0.0 {
            let spread = self.jitter.min(1.0);
            let factor = 1.0 + rand::thread_rng().gen_range(-spread..=spread);
            secs = (secs * factor).min(max_secs);
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}
