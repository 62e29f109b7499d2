use std::time::Duration;

use crate::error::AuthError;

/// Exponential backoff policy for recoverable errors.
///
/// Delays double from `base_delay` up to `max_delay`, for at most
/// `max_attempts` retries. Errors that require re-authentication are never
/// retried; see [`AuthError::requires_reauthentication`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            max_attempts: 4,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based), or `None` once the
    /// attempt budget is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }

    /// Whether `error` should be retried at `attempt`.
    pub fn should_retry(&self, error: &AuthError, attempt: u32) -> bool {
        error.is_recoverable() && attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            max_attempts: 5,
        };

        assert_eq!(policy.delay_for(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(5), None);
    }

    #[test]
    fn only_recoverable_errors_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&AuthError::Timeout, 0));
        assert!(policy.should_retry(
            &AuthError::Database(DatabaseError::Connection("down".into())),
            1
        ));
        assert!(!policy.should_retry(&AuthError::SessionInvalid, 0));
        assert!(!policy.should_retry(&AuthError::Timeout, policy.max_attempts));
    }
}
