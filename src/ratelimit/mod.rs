//! Per-user rate limiting logic and state management.

mod entry;
mod limiter;
mod settings;
mod sweeper;

pub use entry::{RateDecision, RateLimitEntry};
pub use limiter::{RateLimitStatus, RateLimiter};
pub use settings::{duration_from_ms, RateLimitSettings, RateLimitUpdate, MAX_DURATION_MS};
pub use sweeper::Sweeper;
