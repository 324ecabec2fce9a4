//! Rate limit settings and runtime updates.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Longest accepted window, block or breaker timeout: ten years in
/// milliseconds. Larger values are rejected by validation and clamped when
/// converted to a [`Duration`].
pub const MAX_DURATION_MS: u64 = 10 * 365 * 24 * 60 * 60 * 1000;

/// Convert a millisecond setting to a [`Duration`], clamped to
/// [`MAX_DURATION_MS`].
pub fn duration_from_ms(ms: u64) -> Duration {
    i64::try_from(ms.min(MAX_DURATION_MS))
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or(Duration::MAX)
}

/// Limits applied to every user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Fixed window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// How long a user stays blocked after exceeding the limit, in milliseconds
    #[serde(default = "default_block_duration_ms")]
    pub block_duration_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            block_duration_ms: default_block_duration_ms(),
        }
    }
}

fn default_max_requests() -> u64 {
    100
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_block_duration_ms() -> u64 {
    300_000
}

impl RateLimitSettings {
    pub fn new(max_requests: u64, window_ms: u64, block_duration_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
            block_duration_ms,
        }
    }

    pub fn window(&self) -> Duration {
        duration_from_ms(self.window_ms)
    }

    pub fn block_duration(&self) -> Duration {
        duration_from_ms(self.block_duration_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(GuardError::Config(
                "rate_limiting.max_requests must be greater than zero".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(GuardError::Config(
                "rate_limiting.window_ms must be greater than zero".to_string(),
            ));
        }
        if self.window_ms > MAX_DURATION_MS {
            return Err(GuardError::Config(format!(
                "rate_limiting.window_ms must be at most {MAX_DURATION_MS}"
            )));
        }
        if self.block_duration_ms > MAX_DURATION_MS {
            return Err(GuardError::Config(format!(
                "rate_limiting.block_duration_ms must be at most {MAX_DURATION_MS}"
            )));
        }
        Ok(())
    }

    /// Return these settings with every field present in `update` replaced.
    pub fn merged(&self, update: &RateLimitUpdate) -> Self {
        Self {
            max_requests: update.max_requests.unwrap_or(self.max_requests),
            window_ms: update.window_ms.unwrap_or(self.window_ms),
            block_duration_ms: update.block_duration_ms.unwrap_or(self.block_duration_ms),
        }
    }
}

/// A partial settings change; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitUpdate {
    #[serde(default)]
    pub max_requests: Option<u64>,
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub block_duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_partial_update() {
        let settings = RateLimitSettings::default();
        let update = RateLimitUpdate {
            max_requests: Some(10),
            ..Default::default()
        };

        let merged = settings.merged(&update);
        assert_eq!(merged.max_requests, 10);
        assert_eq!(merged.window_ms, settings.window_ms);
        assert_eq!(merged.block_duration_ms, settings.block_duration_ms);
    }

    #[test]
    fn test_empty_update_is_noop() {
        let settings = RateLimitSettings::new(3, 1000, 5000);
        assert_eq!(settings.merged(&RateLimitUpdate::default()), settings);
    }

    #[test]
    fn test_validate() {
        assert!(RateLimitSettings::new(3, 1000, 0).validate().is_ok());
        assert!(RateLimitSettings::new(0, 1000, 5000).validate().is_err());
        assert!(RateLimitSettings::new(3, 0, 5000).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_durations_over_maximum() {
        assert!(RateLimitSettings::new(3, MAX_DURATION_MS, MAX_DURATION_MS)
            .validate()
            .is_ok());
        assert!(RateLimitSettings::new(3, MAX_DURATION_MS + 1, 5000).validate().is_err());
        assert!(RateLimitSettings::new(3, u64::MAX, 5000).validate().is_err());
        assert!(RateLimitSettings::new(3, 1000, u64::MAX).validate().is_err());
    }

    #[test]
    fn test_oversized_durations_clamp_instead_of_wrapping() {
        let settings = RateLimitSettings::new(3, u64::MAX, 10_000_000_000_000_000);
        let ceiling = Duration::milliseconds(MAX_DURATION_MS as i64);
        assert_eq!(settings.window(), ceiling);
        assert_eq!(settings.block_duration(), ceiling);
        assert!(settings.window() > Duration::zero());
    }

    #[test]
    fn test_durations() {
        let settings = RateLimitSettings::new(3, 1000, 5000);
        assert_eq!(settings.window(), Duration::seconds(1));
        assert_eq!(settings.block_duration(), Duration::seconds(5));
    }
}
