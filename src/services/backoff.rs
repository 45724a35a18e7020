use chrono::{DateTime, Duration, Utc};

/// Upper bound on a single retry delay, about 34 years.
const MAX_DELAY_SECS: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    DeadLetter,
}

/// Exponential backoff: `delay = backoff_base ^ attempts` seconds.
pub struct RetryPolicy;

impl RetryPolicy {
    /// `max_retries` is a hard ceiling regardless of delay math.
    pub fn decide(attempts: u32, max_retries: u32) -> RetryDecision {
        if attempts < max_retries {
            RetryDecision::Retry
        } else {
            RetryDecision::DeadLetter
        }
    }

    pub fn delay_secs(backoff_base: u32, attempts: u32) -> u64 {
        u64::from(backoff_base)
            .checked_pow(attempts)
            .unwrap_or(u64::MAX)
            .min(MAX_DELAY_SECS)
    }

    pub fn next_run_at(now: DateTime<Utc>, backoff_base: u32, attempts: u32) -> DateTime<Utc> {
        let delay = Self::delay_secs(backoff_base, attempts) as i64;
        now + Duration::seconds(delay)
    }
}
