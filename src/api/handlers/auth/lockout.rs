//! Failed-login lockout policy.
//!
//! Pure decision logic; persistence happens in the storage layer. The
//! `locked_until` timestamp is the authoritative lock state; the boolean
//! flag stored next to it is only a hint.

use chrono::{DateTime, Duration, Utc};

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    max_attempts: u32,
    lock_duration: Duration,
}

/// Counter state to persist after a failed password check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutUpdate {
    pub failed_attempts: i32,
    pub locked: bool,
    /// `Some` only when this failure crossed the threshold; an existing
    /// future lock below threshold is left untouched.
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, lock_duration: Duration) -> Self {
        Self {
            max_attempts,
            lock_duration,
        }
    }

    /// Decide the state transition for one failed password check.
    #[must_use]
    pub fn on_failure(&self, failed_attempts: i32, now: DateTime<Utc>) -> LockoutUpdate {
        let new_count = failed_attempts.saturating_add(1);
        let should_lock = new_count >= i32::try_from(self.max_attempts).unwrap_or(i32::MAX);
        LockoutUpdate {
            failed_attempts: new_count,
            locked: should_lock,
            locked_until: should_lock.then(|| now + self.lock_duration),
        }
    }

    /// An account is locked while `locked_until` lies strictly in the future.
    /// Exactly-at-now is not locked.
    #[must_use]
    pub fn is_locked(locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        locked_until.is_some_and(|until| until > now)
    }
}

#[cfg(test)]
mod tests {
    use super::{LockoutPolicy, LockoutUpdate};
    use chrono::{Duration, Utc};

    fn policy() -> LockoutPolicy {
        LockoutPolicy::new(5, Duration::minutes(15))
    }

    #[test]
    fn locks_exactly_at_threshold() {
        let policy = policy();
        let now = Utc::now();

        let mut count = 0;
        let mut last = LockoutUpdate {
            failed_attempts: 0,
            locked: false,
            locked_until: None,
        };
        for _ in 0..4 {
            last = policy.on_failure(count, now);
            count = last.failed_attempts;
        }
        // Four failures: still under threshold.
        assert_eq!(last.failed_attempts, 4);
        assert!(!last.locked);
        assert!(last.locked_until.is_none());

        // Fifth failure crosses the line.
        let fifth = policy.on_failure(count, now);
        assert_eq!(fifth.failed_attempts, 5);
        assert!(fifth.locked);
        assert_eq!(fifth.locked_until, Some(now + Duration::minutes(15)));
    }

    #[test]
    fn below_threshold_does_not_touch_existing_lock() {
        // A fresh lock event is the only thing that sets locked_until.
        let policy = policy();
        let update = policy.on_failure(1, Utc::now());
        assert_eq!(update.failed_attempts, 2);
        assert!(update.locked_until.is_none());
    }

    #[test]
    fn lock_boundary_is_exclusive() {
        let now = Utc::now();
        assert!(LockoutPolicy::is_locked(
            Some(now + Duration::seconds(1)),
            now
        ));
        // Exactly at the boundary: no longer locked.
        assert!(!LockoutPolicy::is_locked(Some(now), now));
        assert!(!LockoutPolicy::is_locked(
            Some(now - Duration::seconds(1)),
            now
        ));
        assert!(!LockoutPolicy::is_locked(None, now));
    }

    #[test]
    fn counter_keeps_growing_past_threshold() {
        let policy = policy();
        let now = Utc::now();
        let update = policy.on_failure(7, now);
        assert_eq!(update.failed_attempts, 8);
        assert!(update.locked);
        assert!(update.locked_until.is_some());
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let policy = policy();
        let update = policy.on_failure(i32::MAX, Utc::now());
        assert_eq!(update.failed_attempts, i32::MAX);
    }
}
