//! Retry decisions for failed execution attempts

use std::time::Duration;

use crate::analysis::AnalysisError;

/// What to do with a document after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Set the record back to pending and re-enqueue after the delay
    Retry { delay: Duration },
    /// Terminally fail the record
    Fail,
}

/// Pure retry decision function
///
/// `attempts` is the count already consumed, including the attempt that just
/// failed; a record is retried while attempts stay below the ceiling and the
/// failure class allows it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempt_ceiling: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    pub fn new(attempt_ceiling: u32, backoff_base: Duration, backoff_cap: Duration) -> Self {
        Self {
            attempt_ceiling,
            backoff_base,
            backoff_cap,
        }
    }

    /// Decide whether to retry after a failure
    pub fn decide(&self, attempts: u32, failure: &AnalysisError) -> RetryDecision {
        if !failure.is_retryable() {
            return RetryDecision::Fail;
        }
        if attempts >= self.attempt_ceiling {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry {
            delay: self.backoff_delay(attempts),
        }
    }

    /// Exponential backoff: base doubling per consumed attempt, capped
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        let delay_ms = (self.backoff_base.as_millis() as u64)
            .saturating_mul(1u64 << exp)
            .min(self.backoff_cap.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(20), Duration::from_secs(60))
    }

    #[test]
    fn transient_failures_retry_below_the_ceiling() {
        let policy = policy();
        let err = AnalysisError::Transient("503".to_string());

        assert!(matches!(policy.decide(1, &err), RetryDecision::Retry { .. }));
        assert!(matches!(policy.decide(2, &err), RetryDecision::Retry { .. }));
        assert_eq!(policy.decide(3, &err), RetryDecision::Fail);
        assert_eq!(policy.decide(4, &err), RetryDecision::Fail);
    }

    #[test]
    fn missing_input_never_retries() {
        let policy = policy();
        let err = AnalysisError::MissingInput("gone".to_string());
        assert_eq!(policy.decide(1, &err), RetryDecision::Fail);
    }

    #[test]
    fn unsupported_input_never_retries() {
        let policy = policy();
        let err = AnalysisError::UnsupportedInput("video/mp4".to_string());
        assert_eq!(policy.decide(1, &err), RetryDecision::Fail);
    }

    #[test]
    fn provider_unavailable_follows_normal_retry_rules() {
        let policy = policy();
        let err = AnalysisError::ProviderUnavailable("exhausted".to_string());
        assert!(matches!(policy.decide(1, &err), RetryDecision::Retry { .. }));
        assert_eq!(policy.decide(3, &err), RetryDecision::Fail);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(20));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(40));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(60));
    }
}
