//! Retry policy: decides backoff delays and the attempt budget.

use std::time::Duration;

/// Retry policy for transiently failed work.
///
/// Used twice by a worker: once for delivery (requeue delays of a job) and
/// once for storage (how long to wait before retrying a failed queue call).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Base delay for the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Budget. For delivery: transient failures that are still retried.
    /// For storage: failed calls tolerated before giving up.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Delivery default: 1s base, doubling, capped at 5 minutes, 5 attempts.
    pub fn delivery_default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            max_attempts: 5,
        }
    }

    /// Storage default: 100ms base, doubling, capped at 5s, 10 attempts.
    pub fn storage_default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
        }
    }

    /// Calculate delay for the next retry based on attempt number.
    ///
    /// `attempts` is the number of failures so far (1-indexed).
    /// delay = min(base_delay * multiplier^(attempts - 1), max_delay)
    ///
    /// With base_delay=1s, multiplier=2.0: 1s, 2s, 4s, 8s, ... up to max_delay.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();
        if !delay_secs.is_finite() || delay_secs >= max_secs {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }

    /// Storage bound: has the `attempts`-th consecutive failure used up the budget?
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Delivery budget: `retries` counts transient failures of one job.
    /// A job is retried while `retries <= max_attempts`, so it is sent at most
    /// `max_attempts + 1` times.
    pub fn is_exceeded(&self, retries: u32) -> bool {
        retries > self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::delivery_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_delay, Duration::from_secs(300));
        assert_eq!(policy.max_attempts, 5);
    }

    #[rstest]
    #[case(0, Duration::from_secs(1))]
    #[case(1, Duration::from_secs(1))]
    #[case(2, Duration::from_secs(2))]
    #[case(3, Duration::from_secs(4))]
    #[case(4, Duration::from_secs(8))]
    #[case(9, Duration::from_secs(256))]
    #[case(10, Duration::from_secs(300))]
    #[case(u32::MAX, Duration::from_secs(300))]
    fn exponential_backoff_is_capped(#[case] attempts: u32, #[case] expected: Duration) {
        let policy = RetryPolicy::delivery_default();
        assert_eq!(policy.next_delay(attempts), expected);
    }

    #[test]
    fn backoff_is_monotonic_and_bounded() {
        let policy = RetryPolicy::delivery_default();
        let mut previous = Duration::ZERO;
        for k in 1..64 {
            let d = policy.next_delay(k);
            assert!(d >= previous, "backoff({k}) decreased");
            assert!(d <= policy.max_delay);
            previous = d;
        }
    }

    #[rstest]
    #[case(9, false)]
    #[case(10, true)]
    #[case(11, true)]
    fn storage_bound_is_exhausted_at_max_attempts(#[case] attempts: u32, #[case] exhausted: bool) {
        let policy = RetryPolicy::storage_default();
        assert_eq!(policy.is_exhausted(attempts), exhausted);
    }

    #[rstest]
    #[case(4, false)]
    #[case(5, false)]
    #[case(6, true)]
    fn delivery_budget_is_exceeded_past_max_attempts(#[case] retries: u32, #[case] exceeded: bool) {
        let policy = RetryPolicy::delivery_default();
        assert_eq!(policy.is_exceeded(retries), exceeded);
    }
}
