//! Retry policy for rate-limited and flaky HTTP calls

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Exponential backoff with an upper bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (starting at 0)
    ///
    /// A server hint (`Retry-After` or a rate limit reset) wins over the
    /// exponential delay. Both are capped at `max_delay`.
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or_else(|| {
            let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
            self.base_delay.saturating_mul(factor)
        });
        delay.min(self.max_delay)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Status codes worth retrying: rate limits and server errors
pub fn is_retryable(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Status codes worth retrying for a write that must not be applied twice
///
/// A server error can follow a committed write; a rate limit is rejected
/// before anything runs.
pub fn is_retryable_write(status: u16) -> bool {
    status == 429
}

/// Work out how long the server asked us to wait
///
/// `retry_after` is the `Retry-After` header in seconds. `reset` is a
/// rate limit reset header, either unix seconds or an RFC 3339 timestamp.
pub fn retry_after_hint(
    retry_after: Option<&str>,
    reset: Option<&str>,
    now: DateTime<Utc>,
) -> Option<Duration> {
    if let Some(seconds) = retry_after.and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(seconds));
    }

    let reset = reset?.trim();
    let reset_at = match reset.parse::<i64>() {
        Ok(epoch) => DateTime::from_timestamp(epoch, 0)?,
        Err(_) => DateTime::parse_from_rfc3339(reset).ok()?.with_timezone(&Utc),
    };

    let wait = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
    Some(wait)
}
