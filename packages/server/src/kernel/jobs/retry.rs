//! Retry policy for the in-process task queue.
//!
//! The default policy mirrors how smart media refreshes have always been
//! retried: unbounded attempts, with the delay derived from the *queue length*
//! at failure time (`2^len * base`). `PerAttempt` is the conventional
//! alternative that keys the delay on the job's own attempt count.

use std::time::Duration;

/// How the backoff exponent is chosen after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// `2^queue_len * base`, where `queue_len` is the pending length right
    /// after the failed job has been re-inserted at the front.
    #[default]
    QueueLength,
    /// `2^attempts * base`, where `attempts` counts this job's failures.
    PerAttempt,
}

impl std::str::FromStr for BackoffStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue_length" | "queue-length" => Ok(Self::QueueLength),
            "per_attempt" | "per-attempt" => Ok(Self::PerAttempt),
            other => Err(anyhow::anyhow!("unknown backoff strategy: {}", other)),
        }
    }
}

/// Retry configuration for failed tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: BackoffStrategy,
    /// Multiplier for the exponential term.
    pub base_delay: Duration,
    /// `None` retries forever. `Some(n)` dead-letters a job after `n` failed attempts.
    pub max_attempts: Option<u32>,
    /// Optional ceiling on a single backoff sleep.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: BackoffStrategy::QueueLength,
            base_delay: Duration::from_millis(1000),
            max_attempts: None,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Bounded retries with per-attempt backoff.
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            backoff: BackoffStrategy::PerAttempt,
            max_attempts: Some(max_attempts),
            ..Default::default()
        }
    }

    /// Whether a job that has failed `attempts` times should be dead-lettered.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempts >= max)
    }

    /// Delay before the slot that ran a failed job is released.
    ///
    /// `queue_len` is the pending length after re-insertion, `attempts` the
    /// number of failures this job has accumulated (including the current one).
    pub fn delay_for(&self, queue_len: usize, attempts: u32) -> Duration {
        let exponent = match self.backoff {
            BackoffStrategy::QueueLength => u32::try_from(queue_len).unwrap_or(u32::MAX),
            BackoffStrategy::PerAttempt => attempts,
        };
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_length_backoff_doubles_per_pending_job() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, 7), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1, 1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3, 1), Duration::from_millis(8000));
    }

    #[test]
    fn per_attempt_backoff_ignores_queue_length() {
        let policy = RetryPolicy {
            backoff: BackoffStrategy::PerAttempt,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(40, 1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(0, 2), Duration::from_millis(4000));
    }

    #[test]
    fn huge_exponent_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(500, 1);
        assert!(delay >= Duration::from_millis(1000) * u32::MAX);
    }

    #[test]
    fn max_delay_caps_backoff() {
        let policy = RetryPolicy {
            max_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(10, 1), Duration::from_secs(30));
    }

    #[test]
    fn unbounded_policy_is_never_exhausted() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(u32::MAX));

        let bounded = RetryPolicy::bounded(3);
        assert!(!bounded.is_exhausted(2));
        assert!(bounded.is_exhausted(3));
    }

    #[test]
    fn parses_strategy_names() {
        assert_eq!(
            "queue_length".parse::<BackoffStrategy>().unwrap(),
            BackoffStrategy::QueueLength
        );
        assert_eq!(
            "per-attempt".parse::<BackoffStrategy>().unwrap(),
            BackoffStrategy::PerAttempt
        );
        assert!("linear".parse::<BackoffStrategy>().is_err());
    }
}
