//! Per-user rate limit state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::settings::RateLimitSettings;

/// `now + delta`, pinned to the latest representable instant on overflow.
pub(crate) fn offset(now: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RateDecision {
    /// The request fits in the current window.
    Allowed { remaining: u64 },
    /// The user is blocked until `retry_at`.
    Limited { retry_at: DateTime<Utc> },
}

impl RateDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, RateDecision::Limited { .. })
    }

    /// Requests left in the window, if the request was allowed.
    pub fn remaining(&self) -> Option<u64> {
        match self {
            RateDecision::Allowed { remaining } => Some(*remaining),
            RateDecision::Limited { .. } => None,
        }
    }
}

/// Fixed-window counter for one user.
///
/// `count` only ever goes up within a window; it drops back to 1 when a
/// request arrives after `window_reset_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u64,
    pub window_reset_at: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    /// Start a fresh window holding the current request.
    pub fn open(now: DateTime<Utc>, settings: &RateLimitSettings) -> Self {
        Self {
            count: 1,
            window_reset_at: offset(now, settings.window()),
            blocked_until: None,
        }
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    /// An entry with an elapsed window and no active block behaves exactly
    /// like a missing one, so it can be dropped.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now > self.window_reset_at && !self.is_blocked(now)
    }

    /// Count one request against this entry and decide.
    pub fn record(&mut self, now: DateTime<Utc>, settings: &RateLimitSettings) -> RateDecision {
        if let Some(until) = self.blocked_until {
            if now < until {
                return RateDecision::Limited { retry_at: until };
            }
        }

        if now > self.window_reset_at {
            *self = Self::open(now, settings);
            return RateDecision::Allowed {
                remaining: settings.max_requests.saturating_sub(1),
            };
        }

        self.count += 1;

        if self.count > settings.max_requests {
            let until = offset(now, settings.block_duration());
            self.blocked_until = Some(until);
            return RateDecision::Limited { retry_at: until };
        }

        RateDecision::Allowed {
            remaining: settings.max_requests - self.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::MAX_DURATION_MS;

    fn settings() -> RateLimitSettings {
        RateLimitSettings::new(3, 1000, 5000)
    }

    #[test]
    fn test_open_counts_first_request() {
        let now = Utc::now();
        let entry = RateLimitEntry::open(now, &settings());
        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_reset_at, now + Duration::milliseconds(1000));
        assert!(entry.blocked_until.is_none());
    }

    #[test]
    fn test_record_within_limit() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::open(now, &settings());

        assert_eq!(entry.record(now, &settings()), RateDecision::Allowed { remaining: 1 });
        assert_eq!(entry.record(now, &settings()), RateDecision::Allowed { remaining: 0 });
        assert_eq!(entry.count, 3);
    }

    #[test]
    fn test_record_over_limit_blocks() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::open(now, &settings());
        entry.count = 3;

        let decision = entry.record(now, &settings());
        let until = now + Duration::milliseconds(5000);
        assert_eq!(decision, RateDecision::Limited { retry_at: until });
        assert_eq!(entry.blocked_until, Some(until));
        assert!(entry.is_blocked(now));
    }

    #[test]
    fn test_blocked_does_not_increment() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::open(now, &settings());
        entry.count = 4;
        entry.blocked_until = Some(now + Duration::milliseconds(5000));

        assert!(entry.record(now, &settings()).is_limited());
        assert_eq!(entry.count, 4);
    }

    #[test]
    fn test_window_reset_clears_block() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::open(now, &settings());
        entry.count = 4;
        entry.blocked_until = Some(now + Duration::milliseconds(500));

        let later = now + Duration::milliseconds(1500);
        assert_eq!(entry.record(later, &settings()), RateDecision::Allowed { remaining: 2 });
        assert_eq!(entry.count, 1);
        assert!(entry.blocked_until.is_none());
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let mut entry = RateLimitEntry::open(now, &settings());
        assert!(!entry.is_stale(now));
        assert!(entry.is_stale(now + Duration::milliseconds(1001)));

        entry.blocked_until = Some(now + Duration::milliseconds(5000));
        assert!(!entry.is_stale(now + Duration::milliseconds(1001)));
        assert!(entry.is_stale(now + Duration::milliseconds(5001)));
    }

    #[test]
    fn test_longest_window_near_end_of_time_does_not_overflow() {
        let settings = RateLimitSettings::new(1, MAX_DURATION_MS, MAX_DURATION_MS);
        let now = DateTime::<Utc>::MAX_UTC - Duration::days(1);

        let mut entry = RateLimitEntry::open(now, &settings);
        assert_eq!(entry.window_reset_at, DateTime::<Utc>::MAX_UTC);

        let decision = entry.record(now, &settings);
        assert_eq!(
            decision,
            RateDecision::Limited {
                retry_at: DateTime::<Utc>::MAX_UTC
            }
        );
    }

    #[test]
    fn test_decision_accessors() {
        assert_eq!(RateDecision::Allowed { remaining: 7 }.remaining(), Some(7));
        let limited = RateDecision::Limited { retry_at: Utc::now() };
        assert!(limited.is_limited());
        assert_eq!(limited.remaining(), None);
    }
}
