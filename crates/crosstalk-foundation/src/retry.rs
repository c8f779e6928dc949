//! Retry policy for transient provider errors.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter, bounded by a total budget.
///
/// The policy is pure computation; callers own the sleep and the attempt
/// loop. A dropped segment is preferred over stalling a pipeline, so the
/// defaults keep the whole retry sequence under one second.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_total: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_total: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry attempt (1-based), or `None` when the
    /// attempt budget is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let exp = self.base_delay.saturating_mul(1 << (attempt - 1));
        let jitter_ms = rand::thread_rng().gen_range(0..=exp.as_millis().min(50) as u64);
        Some(exp + Duration::from_millis(jitter_ms))
    }

    /// Whether the elapsed time still leaves room for another attempt.
    pub fn within_budget(&self, elapsed: Duration) -> bool {
        elapsed < self.max_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_stop_at_budget() {
        let policy = RetryPolicy::default();
        let d1 = policy.delay_for(1).unwrap();
        let d2 = policy.delay_for(2).unwrap();
        assert!(d1 >= Duration::from_millis(100));
        assert!(d2 >= Duration::from_millis(200));
        assert!(policy.delay_for(3).is_none());
        assert!(policy.delay_for(0).is_none());
    }

    #[test]
    fn budget_check() {
        let policy = RetryPolicy::default();
        assert!(policy.within_budget(Duration::from_millis(900)));
        assert!(!policy.within_budget(Duration::from_secs(1)));
    }
}
