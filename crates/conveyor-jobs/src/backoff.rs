//! Retry backoff for failed jobs.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Computes `min(base * multiplier^(attempt - 1), max)`.
///
/// `attempt` is the 1-based number of the attempt that just failed.
/// Attempt 0 yields no delay.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration, multiplier: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let raw_ms = base.as_millis() as f64 * multiplier.powi(exp);
    let max_ms = max.as_millis() as f64;

    if !raw_ms.is_finite() || raw_ms >= max_ms {
        max
    } else {
        Duration::from_millis(raw_ms as u64)
    }
}

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt, in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound on any delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between consecutive attempts.
    pub multiplier: f64,

    /// Random spread as a fraction of the computed delay (0.0 disables).
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Creates an exponential policy without jitter.
    pub fn exponential(base: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            base_delay_ms: base.as_millis() as u64,
            max_delay_ms: max.as_millis() as u64,
            multiplier,
            jitter_factor: 0.0,
        }
    }

    /// Creates a policy that always waits `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self::exponential(delay, delay, 1.0)
    }

    /// Enables jitter.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Deterministic delay for the given attempt.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        backoff_delay(
            attempt,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
        )
    }

    /// Delay for the given attempt, with jitter applied when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let spread = (delay.as_millis() as f64 * self.jitter_factor) as u64;
        if spread == 0 {
            return delay;
        }

        let offset = rand::rng().random_range(0..=spread);
        let jittered = (delay.as_millis() as u64)
            .saturating_add(offset)
            .saturating_sub(spread / 2);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_millis(32_000));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_millis(60_000));
    }

    #[test]
    fn test_attempt_zero_has_no_delay() {
        assert_eq!(BackoffPolicy::default().delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn test_monotonic_up_to_cap() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=64 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay >= previous, "attempt {attempt} went backwards");
            assert!(delay <= Duration::from_millis(60_000));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(60_000));
    }

    #[test]
    fn test_huge_attempt_saturates_at_cap() {
        let delay = backoff_delay(
            u32::MAX,
            Duration::from_millis(1000),
            Duration::from_secs(60),
            2.0,
        );
        assert_eq!(delay, Duration::from_secs(60));
    }

    #[test]
    fn test_fixed_policy() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let policy = BackoffPolicy::default().with_jitter(0.2);
        for _ in 0..100 {
            let delay = policy.delay_for_attempt(2).as_millis();
            assert!((1800..=2200).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_jitter_factor_is_clamped() {
        assert_eq!(BackoffPolicy::default().with_jitter(7.0).jitter_factor, 1.0);
        assert_eq!(BackoffPolicy::default().with_jitter(0.3).without_jitter().jitter_factor, 0.0);
    }
}
