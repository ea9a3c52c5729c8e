//! Exponential retry delays.

use std::time::Duration;

/// Delay schedule between failed attempts.
///
/// The delay after attempt `n` (1-based) is `base × multiplier^(n−1)`,
/// capped at `max`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vcompute::scheduler::BackoffPolicy;
///
/// let policy = BackoffPolicy {
///     base: Duration::from_millis(100),
///     multiplier: 2.0,
///     max: Duration::from_millis(350),
/// };
/// assert_eq!(policy.delay_after(1), Duration::from_millis(100));
/// assert_eq!(policy.delay_after(2), Duration::from_millis(200));
/// assert_eq!(policy.delay_after(3), Duration::from_millis(350));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Growth factor per further failure.
    pub multiplier: f64,
    /// Upper bound on any delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the `attempt`-th failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.base.as_millis() as f64 * factor;
        let max_millis = self.max.as_millis() as f64;
        if !millis.is_finite() || millis >= max_millis {
            self.max
        } else {
            Duration::from_millis(millis.round() as u64)
        }
    }
}
