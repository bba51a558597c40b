use chrono::{DateTime, Duration, Utc};

use crate::error::RetryBlocked;

/// Gate for re-opening a failed invoice.
///
/// A failed invoice may be retried at most `max_retries` times, and
/// only after `cooldown` has elapsed since the failed payment was last
/// touched. Callers pass `now` explicitly so the gate stays testable.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            cooldown: Duration::seconds(90),
        }
    }
}

impl RetryPolicy {
    pub fn check(
        &self,
        retry_count: u32,
        last_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RetryBlocked> {
        if retry_count >= self.max_retries {
            return Err(RetryBlocked::MaxAttempts);
        }

        let elapsed = now - last_attempt_at;
        if elapsed < self.cooldown {
            // Whole seconds left, rounded up for the partial second.
            let seconds_remaining = (self.cooldown - elapsed).num_seconds() + 1;
            return Err(RetryBlocked::Cooldown { seconds_remaining });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn blocks_within_cooldown_with_seconds_remaining() {
        let policy = RetryPolicy::default();
        let now = t0() + Duration::seconds(30);

        let err = policy.check(0, t0(), now).unwrap_err();
        assert_eq!(err, RetryBlocked::Cooldown { seconds_remaining: 61 });
        assert_eq!(
            err.to_string(),
            "Please wait 61 seconds before retrying"
        );
    }

    #[test]
    fn allows_after_cooldown() {
        let policy = RetryPolicy::default();
        let now = t0() + Duration::seconds(95);

        assert!(policy.check(0, t0(), now).is_ok());
    }

    #[test]
    fn allows_at_exactly_the_cooldown_boundary() {
        let policy = RetryPolicy::default();
        let now = t0() + Duration::seconds(90);

        assert!(policy.check(0, t0(), now).is_ok());
    }

    #[test]
    fn blocks_once_retries_are_spent_even_after_cooldown() {
        let policy = RetryPolicy::default();
        let now = t0() + Duration::seconds(600);

        let err = policy.check(1, t0(), now).unwrap_err();
        assert_eq!(err, RetryBlocked::MaxAttempts);
    }

    #[test]
    fn max_attempts_takes_precedence_over_cooldown() {
        let policy = RetryPolicy::default();
        let now = t0() + Duration::seconds(10);

        let err = policy.check(1, t0(), now).unwrap_err();
        assert_eq!(err, RetryBlocked::MaxAttempts);
    }
}
