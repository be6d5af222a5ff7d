//! Pure inactivity evaluator.
//!
//! Maps an account's last recorded activity and configured threshold to a
//! lifecycle signal. Deterministic and side-effect free: given the same
//! `(now, last_activity_at, threshold_days)` the result is always the same,
//! which is what makes the monitor idempotent between ticks.

use chrono::{DateTime, Utc};

/// Signal computed from an account's activity history.
///
/// `Inactive` is a signal, not a persisted account state: it means "the
/// threshold has been crossed, escalate to settlement".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InactivitySignal {
    /// Activity recorded within the safe window.
    Active,
    /// The warning window (70% of the threshold, at least one day) has been
    /// entered, or no activity has ever been recorded.
    Warned,
    /// The threshold has been crossed.
    Inactive,
}

/// Evaluates the inactivity signal for one account.
///
/// Elapsed time is measured in whole days (floor). An account with no
/// recorded activity is always `Warned` -- it cannot be presumed alive.
#[must_use]
pub fn evaluate(
    now: DateTime<Utc>,
    last_activity_at: Option<DateTime<Utc>>,
    threshold_days: u32,
) -> InactivitySignal {
    let Some(last_activity_at) = last_activity_at else {
        return InactivitySignal::Warned;
    };

    let elapsed_days = (now - last_activity_at).num_days();
    if elapsed_days >= i64::from(threshold_days) {
        return InactivitySignal::Inactive;
    }

    // floor(0.7 * threshold), clamped to at least one day so a short
    // threshold still gets a warning window.
    let warn_after = (i64::from(threshold_days) * 7 / 10).max(1);
    if elapsed_days >= warn_after {
        return InactivitySignal::Warned;
    }

    InactivitySignal::Active
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    #[test]
    fn absent_activity_is_always_warned() {
        assert_eq!(evaluate(at(1_700_000_000), None, 30), InactivitySignal::Warned);
        assert_eq!(evaluate(at(0), None, 1), InactivitySignal::Warned);
    }

    #[test]
    fn threshold_boundaries_for_thirty_days() {
        let now = at(1_700_000_000);
        let days = |n: i64| Some(now - Duration::days(n));

        assert_eq!(evaluate(now, days(20), 30), InactivitySignal::Active);
        assert_eq!(evaluate(now, days(21), 30), InactivitySignal::Warned);
        assert_eq!(evaluate(now, days(29), 30), InactivitySignal::Warned);
        assert_eq!(evaluate(now, days(30), 30), InactivitySignal::Inactive);
        assert_eq!(evaluate(now, days(31), 30), InactivitySignal::Inactive);
    }

    #[test]
    fn partial_days_floor_toward_active() {
        let now = at(1_700_000_000);
        // 29 days and 23 hours elapsed: still 29 whole days.
        let last = now - Duration::days(29) - Duration::hours(23);
        assert_eq!(evaluate(now, Some(last), 30), InactivitySignal::Warned);
    }

    #[test]
    fn warning_window_is_at_least_one_day() {
        let now = at(1_700_000_000);
        // threshold 1: floor(0.7) = 0, clamped to 1, so day 0 is Active
        // and day 1 is already Inactive (threshold crossed).
        assert_eq!(
            evaluate(now, Some(now - Duration::hours(12)), 1),
            InactivitySignal::Active
        );
        assert_eq!(
            evaluate(now, Some(now - Duration::days(1)), 1),
            InactivitySignal::Inactive
        );
        // threshold 2: warn window starts at day 1.
        assert_eq!(
            evaluate(now, Some(now - Duration::days(1)), 2),
            InactivitySignal::Warned
        );
    }

    #[test]
    fn future_activity_is_active() {
        let now = at(1_700_000_000);
        assert_eq!(
            evaluate(now, Some(now + Duration::days(2)), 30),
            InactivitySignal::Active
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let now = at(1_700_000_000);
        let last = Some(now - Duration::days(25));
        assert_eq!(evaluate(now, last, 30), evaluate(now, last, 30));
    }
}
