use std::time;

use rand::Rng;

#[derive(Copy, Clone, Debug)]
/// A single reusable "retry with backoff" primitive shared by the HTTP fetcher, the
/// submitter's broadcast loop and the sequence manager's periodic sync.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<time::Duration>,
    /// Upper bound on the number of attempts before giving up. `None` means unbounded.
    max_attempts: Option<u32>,
    /// Randomize each computed interval by +/- this fraction (0.0 disables jitter).
    jitter_fraction: f64,
}

impl RetryPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
            max_attempts: None,
            jitter_fraction: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_jitter(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = jitter_fraction.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Whether `attempt` (1-indexed) is still allowed to run.
    pub fn allows(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }

    /// Calculate the time until the next retry for a given attempt (0-indexed).
    pub fn time_until_next_retry(
        &self,
        attempt: u32,
        preferred_retry_interval: Option<time::Duration>,
    ) -> time::Duration {
        let candidate_interval = self.initial_interval * self.backoff_coefficient.pow(attempt);

        let interval = match (preferred_retry_interval, self.maximum_interval) {
            (Some(duration), Some(max_interval)) => std::cmp::min(
                std::cmp::max(std::cmp::min(candidate_interval, max_interval), duration),
                max_interval,
            ),
            (Some(duration), None) => std::cmp::max(candidate_interval, duration),
            (None, Some(max_interval)) => std::cmp::min(candidate_interval, max_interval),
            (None, None) => candidate_interval,
        };

        self.apply_jitter(interval)
    }

    fn apply_jitter(&self, interval: time::Duration) -> time::Duration {
        if self.jitter_fraction <= 0.0 {
            return interval;
        }

        let mut rng = rand::thread_rng();
        let factor = 1.0 + rng.gen_range(-self.jitter_fraction..=self.jitter_fraction);
        interval.mul_f64(factor.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_secs(1),
            maximum_interval: None,
            max_attempts: None,
            jitter_fraction: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(2, time::Duration::from_secs(1), Some(time::Duration::from_secs(10)));
        assert_eq!(policy.time_until_next_retry(0, None), time::Duration::from_secs(1));
        assert_eq!(policy.time_until_next_retry(1, None), time::Duration::from_secs(2));
        assert_eq!(policy.time_until_next_retry(2, None), time::Duration::from_secs(4));
        assert_eq!(policy.time_until_next_retry(10, None), time::Duration::from_secs(10));
    }

    #[test]
    fn max_attempts_bounds_allows() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        assert!(policy.allows(1));
        assert!(policy.allows(3));
        assert!(!policy.allows(4));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(2, time::Duration::from_secs(10), None).with_jitter(0.5);
        for _ in 0..100 {
            let d = policy.time_until_next_retry(0, None);
            assert!(d >= time::Duration::from_secs(5) && d <= time::Duration::from_secs(15));
        }
    }
}
