//! Background removal of stale rate limit entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Handle to the periodic sweep task. The task stops when the handle is
/// stopped or dropped.
pub struct Sweeper {
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn a task that purges stale entries every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        info!(interval_secs = interval.as_secs_f64(), "Starting rate limit sweeper");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let removed = limiter.purge_stale();
                if removed > 0 {
                    debug!(
                        removed = removed,
                        tracked_users = limiter.tracked_users(),
                        "Purged stale rate limit entries"
                    );
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Stop the sweep task.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Rate limit sweeper stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
