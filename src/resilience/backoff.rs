//! Exponential backoff with jitter for reconnects and failed polls.

use std::time::Duration;

use rand::Rng;

/// Backoff bounds for a retrying loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 means no wait.
    ///
    /// Doubles per attempt up to `max`, plus up to 10% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow((attempt - 1).min(31));
        let capped = self.base.saturating_mul(factor).min(self.max);

        let jitter_range = capped.as_millis() as u64 / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        capped + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_capped() {
        let policy = BackoffPolicy::from_millis(100, 1000);
        assert_eq!(policy.delay(0), Duration::ZERO);

        let b1 = policy.delay(1).as_millis();
        assert!((100..110).contains(&b1), "got {b1}");

        let b2 = policy.delay(2).as_millis();
        assert!((200..220).contains(&b2), "got {b2}");

        let capped = policy.delay(10).as_millis();
        assert!((1000..1100).contains(&capped), "got {capped}");
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = BackoffPolicy::from_millis(500, 30_000);
        assert!(policy.delay(u32::MAX) <= Duration::from_millis(33_000));
    }

    #[test]
    fn test_max_below_base_is_raised() {
        let policy = BackoffPolicy::from_millis(200, 50);
        assert!(policy.delay(1) >= Duration::from_millis(200));
    }
}
