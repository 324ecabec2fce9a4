//! Core per-user rate limiter implementation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::entry::{offset, RateDecision, RateLimitEntry};
use super::settings::{RateLimitSettings, RateLimitUpdate};
use crate::clock::Clock;
use crate::error::Result;

/// Read-only view of one user's rate limit state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub current_count: u64,
    pub max_requests: u64,
    pub reset_time: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub is_blocked: bool,
}

/// Fixed-window rate limiter keyed by user id.
///
/// This struct is thread-safe and can be shared across multiple tasks. Each
/// check holds the shard lock for its key for the whole read-decide-write,
/// so concurrent requests from the same user never lose an increment.
pub struct RateLimiter {
    /// Rate limit entries indexed by user id
    entries: DashMap<String, RateLimitEntry>,
    /// Limits applied to every subsequent check
    settings: RwLock<RateLimitSettings>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given settings.
    pub fn new(settings: RateLimitSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            settings: RwLock::new(settings),
            clock,
        }
    }

    /// Count one request for `user_id` and decide whether it may proceed.
    pub fn check_and_record(&self, user_id: &str) -> RateDecision {
        let settings = *self.settings.read();
        let now = self.clock.now();

        let decision = match self.entries.entry(user_id.to_string()) {
            Entry::Vacant(vacant) => {
                debug!(
                    user_id = %user_id,
                    max_requests = settings.max_requests,
                    window_ms = settings.window_ms,
                    "Creating new rate limit entry"
                );
                vacant.insert(RateLimitEntry::open(now, &settings));
                RateDecision::Allowed {
                    remaining: settings.max_requests.saturating_sub(1),
                }
            }
            Entry::Occupied(mut occupied) => {
                let was_blocked = occupied.get().is_blocked(now);
                let decision = occupied.get_mut().record(now, &settings);
                if let RateDecision::Limited { retry_at } = decision {
                    if !was_blocked {
                        warn!(
                            user_id = %user_id,
                            count = occupied.get().count,
                            max_requests = settings.max_requests,
                            blocked_until = %retry_at,
                            "Rate limit exceeded, blocking user"
                        );
                    }
                }
                decision
            }
        };

        trace!(user_id = %user_id, decision = ?decision, "Rate limit checked");
        decision
    }

    /// Report the state of `user_id` without counting a request.
    pub fn status(&self, user_id: &str) -> RateLimitStatus {
        let settings = *self.settings.read();
        let now = self.clock.now();

        match self.entries.get(user_id) {
            Some(entry) => RateLimitStatus {
                current_count: entry.count,
                max_requests: settings.max_requests,
                reset_time: entry.window_reset_at,
                blocked_until: entry.blocked_until,
                is_blocked: entry.is_blocked(now),
            },
            None => RateLimitStatus {
                current_count: 0,
                max_requests: settings.max_requests,
                reset_time: offset(now, settings.window()),
                blocked_until: None,
                is_blocked: false,
            },
        }
    }

    /// Forget everything about `user_id`. Calling it again is a no-op.
    pub fn reset(&self, user_id: &str) {
        if self.entries.remove(user_id).is_some() {
            info!(user_id = %user_id, "Rate limit reset");
        }
    }

    /// Apply a partial settings change to every later check.
    ///
    /// Existing entries keep their current window boundaries and blocks.
    pub fn update_settings(&self, update: &RateLimitUpdate) -> Result<RateLimitSettings> {
        let mut settings = self.settings.write();
        let merged = settings.merged(update);
        merged.validate()?;
        *settings = merged;

        info!(
            max_requests = merged.max_requests,
            window_ms = merged.window_ms,
            block_duration_ms = merged.block_duration_ms,
            "Rate limit settings updated"
        );
        Ok(merged)
    }

    /// Get the current settings.
    pub fn settings(&self) -> RateLimitSettings {
        *self.settings.read()
    }

    /// Drop entries whose window and block have both elapsed.
    ///
    /// Returns the number of entries removed.
    pub fn purge_stale(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_stale(now));
        before.saturating_sub(self.entries.len())
    }

    /// Get the number of tracked users.
    pub fn tracked_users(&self) -> usize {
        self.entries.len()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::MAX_DURATION_MS;
    use chrono::Duration;

    fn limiter(max: u64, window_ms: u64, block_ms: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(
            RateLimitSettings::new(max, window_ms, block_ms),
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn test_first_request_creates_entry() {
        let (limiter, _) = limiter(100, 60_000, 300_000);
        assert_eq!(limiter.tracked_users(), 0);

        let decision = limiter.check_and_record("alice");
        assert_eq!(decision, RateDecision::Allowed { remaining: 99 });
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn test_remaining_strictly_decreases_within_window() {
        let (limiter, clock) = limiter(10, 60_000, 300_000);

        let mut last = u64::MAX;
        for _ in 0..10 {
            let remaining = limiter.check_and_record("alice").remaining().unwrap();
            assert!(remaining < last);
            last = remaining;
            clock.advance(10);
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn test_documented_scenario() {
        let (limiter, clock) = limiter(3, 1000, 5000);

        assert_eq!(limiter.check_and_record("u"), RateDecision::Allowed { remaining: 2 });
        clock.advance(100);
        assert_eq!(limiter.check_and_record("u"), RateDecision::Allowed { remaining: 1 });
        clock.advance(100);
        assert_eq!(limiter.check_and_record("u"), RateDecision::Allowed { remaining: 0 });
        clock.advance(100);
        assert!(limiter.check_and_record("u").is_limited());
        clock.advance(100);
        assert!(limiter.check_and_record("u").is_limited());

        // t = 5400ms, block (set at 300ms) has expired
        clock.advance(5000);
        assert_eq!(limiter.check_and_record("u"), RateDecision::Allowed { remaining: 2 });
    }

    #[test]
    fn test_block_outlives_window_reset() {
        let (limiter, clock) = limiter(2, 1000, 5000);

        limiter.check_and_record("u");
        limiter.check_and_record("u");
        assert!(limiter.check_and_record("u").is_limited());

        // Several windows pass but the block still holds
        for _ in 0..4 {
            clock.advance(1100);
            assert!(limiter.check_and_record("u").is_limited());
        }
    }

    #[test]
    fn test_users_are_independent() {
        let (limiter, _) = limiter(1, 60_000, 300_000);

        limiter.check_and_record("alice");
        assert!(limiter.check_and_record("alice").is_limited());
        assert!(!limiter.check_and_record("bob").is_limited());
    }

    #[test]
    fn test_status_without_entry() {
        let (limiter, clock) = limiter(5, 1000, 5000);
        let status = limiter.status("nobody");

        assert_eq!(status.current_count, 0);
        assert_eq!(status.max_requests, 5);
        assert_eq!(status.reset_time, clock.now() + Duration::milliseconds(1000));
        assert!(!status.is_blocked);
        assert!(status.blocked_until.is_none());
    }

    #[test]
    fn test_status_reports_block() {
        let (limiter, clock) = limiter(1, 1000, 5000);
        limiter.check_and_record("u");
        limiter.check_and_record("u");

        let status = limiter.status("u");
        assert_eq!(status.current_count, 2);
        assert!(status.is_blocked);
        assert_eq!(status.blocked_until, Some(clock.now() + Duration::milliseconds(5000)));

        clock.advance(5001);
        assert!(!limiter.status("u").is_blocked);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (limiter, _) = limiter(1, 60_000, 300_000);
        limiter.check_and_record("u");
        limiter.check_and_record("u");

        limiter.reset("u");
        assert_eq!(limiter.tracked_users(), 0);
        limiter.reset("u");
        assert_eq!(limiter.tracked_users(), 0);

        assert_eq!(limiter.check_and_record("u"), RateDecision::Allowed { remaining: 0 });
    }

    #[test]
    fn test_update_settings_applies_to_later_checks() {
        let (limiter, _) = limiter(100, 60_000, 300_000);
        limiter.check_and_record("u");

        let updated = limiter
            .update_settings(&RateLimitUpdate {
                max_requests: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.max_requests, 2);
        assert_eq!(updated.window_ms, 60_000);

        assert_eq!(limiter.check_and_record("u"), RateDecision::Allowed { remaining: 0 });
        assert!(limiter.check_and_record("u").is_limited());
    }

    #[test]
    fn test_update_settings_rejects_zero() {
        let (limiter, _) = limiter(100, 60_000, 300_000);
        let result = limiter.update_settings(&RateLimitUpdate {
            window_ms: Some(0),
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(limiter.settings().window_ms, 60_000);
    }

    #[test]
    fn test_update_settings_rejects_out_of_range_durations() {
        let (limiter, _) = limiter(2, 60_000, 300_000);
        let before = limiter.settings();

        for update in [
            RateLimitUpdate {
                window_ms: Some(10_000_000_000_000_000),
                ..Default::default()
            },
            RateLimitUpdate {
                window_ms: Some(u64::MAX),
                ..Default::default()
            },
            RateLimitUpdate {
                max_requests: Some(5),
                block_duration_ms: Some(MAX_DURATION_MS + 1),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                limiter.update_settings(&update),
                Err(crate::error::GuardError::Config(_))
            ));
            assert_eq!(limiter.settings(), before);
        }

        assert!(limiter.check_and_record("u").remaining().is_some());
        assert!(limiter.check_and_record("u").remaining().is_some());
        assert!(limiter.check_and_record("u").is_limited());
    }

    #[test]
    fn test_update_settings_accepts_maximum_durations() {
        let (limiter, _) = limiter(2, 60_000, 300_000);
        let updated = limiter
            .update_settings(&RateLimitUpdate {
                window_ms: Some(MAX_DURATION_MS),
                block_duration_ms: Some(MAX_DURATION_MS),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.window_ms, MAX_DURATION_MS);

        limiter.check_and_record("u");
        limiter.check_and_record("u");
        assert!(limiter.check_and_record("u").is_limited());
        assert!(limiter.status("u").is_blocked);
    }

    #[test]
    fn test_unvalidated_huge_window_still_limits() {
        let (limiter, _) = limiter(2, u64::MAX, u64::MAX);

        let allowed = (0..10)
            .filter(|_| !limiter.check_and_record("u").is_limited())
            .count();
        assert_eq!(allowed, 2);

        let status = limiter.status("nobody");
        assert_eq!(status.current_count, 0);
        assert!(status.reset_time > Utc::now());
    }

    #[test]
    fn test_purge_stale_keeps_active_and_blocked() {
        let (limiter, clock) = limiter(1, 1000, 10_000);

        limiter.check_and_record("idle");
        limiter.check_and_record("blocked");
        limiter.check_and_record("blocked");
        clock.advance(1500);
        limiter.check_and_record("active");

        assert_eq!(limiter.purge_stale(), 1);
        assert_eq!(limiter.tracked_users(), 2);
        assert!(limiter.status("blocked").is_blocked);
        assert_eq!(limiter.status("active").current_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_checks_do_not_lose_updates() {
        let (limiter, _) = limiter(1000, 60_000, 300_000);
        let limiter = Arc::new(limiter);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        limiter.check_and_record("shared");
                    }
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        assert_eq!(limiter.status("shared").current_count, 400);
    }
}
