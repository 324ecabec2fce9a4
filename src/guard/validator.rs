//! The validation orchestrator.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::request::{AuthRequest, AuthResponse};
use crate::audit::{AuditLog, AuditLogEntry, AuditMetrics, DEFAULT_RECENT_LIMIT};
use crate::breaker::{CircuitBreaker, CircuitBreakerStatus};
use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::error::{AuthFailure, Result};
use crate::ratelimit::{
    RateDecision, RateLimitSettings, RateLimitStatus, RateLimitUpdate, RateLimiter, Sweeper,
};
use crate::session::{Session, SessionError, SessionProvider};

/// Coarse breaker position reported alongside the audit metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Open,
    Closed,
}

/// Audit aggregates plus the current breaker position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    #[serde(flatten)]
    pub audit: AuditMetrics,
    pub circuit_breaker_status: CircuitState,
}

/// Guards calls to protected endpoints.
///
/// Build one per process and share it behind an `Arc`. Each call to
/// [`AuthGuard::validate_request`] runs the breaker check, the per-user rate
/// limit and the session lookup, in that order, and writes exactly one audit
/// entry.
pub struct AuthGuard<P: SessionProvider> {
    rate_limiter: Arc<RateLimiter>,
    breaker: CircuitBreaker,
    audit: AuditLog,
    provider: P,
    clock: Arc<dyn Clock>,
}

impl<P: SessionProvider> AuthGuard<P> {
    /// Create a guard reading the system clock.
    pub fn new(config: &GuardConfig, provider: P) -> Self {
        Self::with_clock(config, provider, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &GuardConfig, provider: P, clock: Arc<dyn Clock>) -> Self {
        info!(
            max_requests = config.rate_limiting.max_requests,
            window_ms = config.rate_limiting.window_ms,
            failure_threshold = config.circuit_breaker.failure_threshold,
            audit_capacity = config.audit.capacity,
            "Auth guard initialized"
        );

        Self {
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limiting, clock.clone())),
            breaker: CircuitBreaker::new(&config.circuit_breaker, clock.clone()),
            audit: AuditLog::new(config.audit.capacity),
            provider,
            clock,
        }
    }

    /// Start purging stale rate limit entries every `interval`.
    pub fn start_sweeper(&self, interval: Duration) -> Sweeper {
        Sweeper::spawn(self.rate_limiter.clone(), interval)
    }

    /// Validate one request. Never fails: refusals come back as a response
    /// with `success == false`.
    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            endpoint = %request.endpoint,
            method = %request.method
        )
    )]
    pub async fn validate_request(&self, request: &AuthRequest) -> AuthResponse {
        let started = Instant::now();
        let outcome = self.evaluate(request).await;
        let audit_log = self.write_audit(request, &outcome, started.elapsed());

        match outcome {
            Ok(session) => {
                debug!("Request authorized");
                AuthResponse::granted(session, audit_log)
            }
            Err(failure) => {
                warn!(reason = %failure, "Request refused");
                AuthResponse::refused(failure, audit_log)
            }
        }
    }

    async fn evaluate(&self, request: &AuthRequest) -> std::result::Result<Session, AuthFailure> {
        if self.breaker.is_open() {
            return Err(AuthFailure::CircuitBreakerOpen);
        }

        if let RateDecision::Limited { .. } = self.rate_limiter.check_and_record(&request.user_id)
        {
            return Err(AuthFailure::RateLimited);
        }

        let result = self.check_session(request).await;
        match result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }

    async fn check_session(&self, request: &AuthRequest) -> std::result::Result<Session, AuthFailure> {
        let fetched = AssertUnwindSafe(self.provider.get_session())
            .catch_unwind()
            .await
            .map_err(|panic| AuthFailure::Unexpected(panic_message(panic)))?;

        let session = match fetched {
            Ok(Some(session)) => session,
            Ok(None) => return Err(AuthFailure::InvalidSession),
            Err(SessionError::Rejected(reason)) => {
                debug!(reason = %reason, "Session provider rejected lookup");
                return Err(AuthFailure::InvalidSession);
            }
            Err(SessionError::Unavailable(message)) => {
                return Err(AuthFailure::Unexpected(message));
            }
        };

        if session.user_id() != request.user_id {
            return Err(AuthFailure::UserIdMismatch);
        }

        if session.is_expired(self.clock.now()) {
            return Err(AuthFailure::SessionExpired);
        }

        Ok(session)
    }

    fn write_audit(
        &self,
        request: &AuthRequest,
        outcome: &std::result::Result<Session, AuthFailure>,
        elapsed: Duration,
    ) -> AuditLogEntry {
        let failure = outcome.as_ref().err().cloned();
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            user_id: request.user_id.clone(),
            endpoint: request.endpoint.clone(),
            method: request.method.clone(),
            ip: request.ip.clone(),
            user_agent: request.user_agent.clone(),
            success: outcome.is_ok(),
            error: failure.as_ref().map(|f| f.to_string()),
            failure,
            response_time_ms: elapsed.as_millis() as u64,
        };

        self.audit.record(entry.clone());
        entry
    }

    /// The most recent `limit` audit entries, newest last.
    pub fn audit_logs(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.audit.recent(limit)
    }

    /// The last [`DEFAULT_RECENT_LIMIT`] audit entries, newest last.
    pub fn audit_logs_recent(&self) -> Vec<AuditLogEntry> {
        self.audit_logs(DEFAULT_RECENT_LIMIT)
    }

    pub fn rate_limit_status(&self, user_id: &str) -> RateLimitStatus {
        self.rate_limiter.status(user_id)
    }

    pub fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.breaker.status()
    }

    /// Administrative override; the caller is trusted.
    pub fn reset_rate_limit(&self, user_id: &str) {
        self.rate_limiter.reset(user_id);
    }

    /// Administrative override; the caller is trusted.
    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
    }

    /// Change the rate limits used by every later check.
    pub fn update_rate_limit_config(&self, update: &RateLimitUpdate) -> Result<RateLimitSettings> {
        self.rate_limiter.update_settings(update)
    }

    pub fn security_metrics(&self) -> SecurityMetrics {
        SecurityMetrics {
            audit: self.audit.metrics(),
            circuit_breaker_status: if self.breaker.is_open() {
                CircuitState::Open
            } else {
                CircuitState::Closed
            },
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "session provider panicked".to_string()
    }
}
