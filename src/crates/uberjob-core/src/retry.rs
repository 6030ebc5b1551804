//! Retry schedules for node evaluation
//!
//! A [`RetryPolicy`] answers one question for the executor: after a failed
//! attempt, how long until the next one - or is the work exhausted? Delays
//! grow geometrically from a first delay up to a ceiling, and jitter spreads
//! simultaneous retries apart so a burst of failures does not come back in
//! lockstep. An evaluation only counts as an error toward the run's error
//! limit once its policy is exhausted.
//!
//! Retry transient conditions (timeouts, rate limits, contended resources);
//! do not retry permanent failures or non-idempotent side effects.

use rand::Rng;
use std::time::Duration;

/// How often a node evaluation is attempted and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: usize,
    first_delay: Duration,
    growth: f64,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    /// Attempt each evaluation up to `attempts` times (the first try included).
    ///
    /// Defaults: first delay 500ms, doubling per attempt, capped at 128s,
    /// with jitter.
    pub fn attempts(attempts: usize) -> Self {
        Self {
            attempts: attempts.max(1),
            first_delay: Duration::from_millis(500),
            growth: 2.0,
            max_delay: Duration::from_secs(128),
            jitter: true,
        }
    }

    /// Delay before the first retry.
    pub fn with_first_delay(mut self, delay: Duration) -> Self {
        self.first_delay = delay;
        self
    }

    /// Factor the delay grows by after each further failure.
    pub fn with_growth(mut self, growth: f64) -> Self {
        self.growth = growth;
        self
    }

    /// Upper bound on any single delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Keep delays exact instead of randomized.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> usize {
        self.attempts
    }

    /// The wait after failed attempt number `attempt` (1-based), or `None`
    /// when the policy is exhausted and the failure should stand.
    ///
    /// The first retry waits the first delay; each further retry multiplies
    /// it by the growth factor, capped at the ceiling. Jitter scales the
    /// result by a random factor in `0.5..=1.5`.
    pub fn backoff_after(&self, attempt: usize) -> Option<Duration> {
        if attempt >= self.attempts {
            return None;
        }
        let scaled = self.first_delay.as_secs_f64() * self.growth.powi(attempt as i32 - 1);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        let seconds = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            capped
        };
        Some(Duration::from_secs_f64(seconds))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::attempts(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_up_to_the_ceiling() {
        let policy = RetryPolicy::attempts(6)
            .with_first_delay(Duration::from_secs(1))
            .with_growth(2.0)
            .with_max_delay(Duration::from_secs(10))
            .without_jitter();

        assert_eq!(policy.backoff_after(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.backoff_after(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.backoff_after(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.backoff_after(4), Some(Duration::from_secs(8)));
        // 16s, held at the ceiling.
        assert_eq!(policy.backoff_after(5), Some(Duration::from_secs(10)));
        assert_eq!(policy.backoff_after(6), None);
    }

    #[test]
    fn exhaustion_ends_the_schedule() {
        let policy = RetryPolicy::attempts(1);
        assert_eq!(policy.backoff_after(1), None);

        let policy = RetryPolicy::attempts(3).without_jitter();
        assert!(policy.backoff_after(2).is_some());
        assert_eq!(policy.backoff_after(3), None);
    }

    #[test]
    fn jitter_stays_within_half_to_one_and_a_half() {
        let policy = RetryPolicy::attempts(2)
            .with_first_delay(Duration::from_secs(1))
            .with_growth(1.0);

        let delay = policy.backoff_after(1).unwrap();
        assert!(delay >= Duration::from_millis(500));
        assert!(delay <= Duration::from_millis(1500));
    }

    #[test]
    fn a_policy_always_allows_the_first_attempt() {
        assert_eq!(RetryPolicy::attempts(0).max_attempts(), 1);
    }
}
