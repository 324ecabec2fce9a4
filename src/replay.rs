//! Replaying a recorded request sequence through a fresh guard.
//!
//! A scenario names the session the identity provider should report and the
//! requests to send. The report shows how each request was answered along
//! with the guard's state once all of them have run.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::{AuditLogEntry, DEFAULT_RECENT_LIMIT};
use crate::breaker::CircuitBreakerStatus;
use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::error::{AuthFailure, Result};
use crate::guard::{AuthGuard, AuthRequest, SecurityMetrics};
use crate::session::{Session, SessionError, StaticSessionProvider};

/// A scripted sequence of requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Session the provider reports; absent means "no session"
    #[serde(default)]
    pub session: Option<Session>,

    /// If set, the provider answers with this error instead of a session
    #[serde(default)]
    pub session_error: Option<String>,

    #[serde(default)]
    pub requests: Vec<ScenarioRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRequest {
    #[serde(flatten)]
    pub request: AuthRequest,

    /// How many times to send this request back to back
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

fn default_repeat() -> u32 {
    1
}

impl Scenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading replay scenario");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// How one replayed request was answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub user_id: String,
    pub endpoint: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AuthFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub outcomes: Vec<ReplayOutcome>,
    pub audit_log: Vec<AuditLogEntry>,
    pub metrics: SecurityMetrics,
    pub circuit_breaker: CircuitBreakerStatus,
}

/// Run `scenario` against a new guard built from `config`.
pub async fn run(config: &GuardConfig, scenario: &Scenario) -> ReplayReport {
    run_with_clock(config, scenario, Arc::new(SystemClock)).await
}

pub async fn run_with_clock(
    config: &GuardConfig,
    scenario: &Scenario,
    clock: Arc<dyn Clock>,
) -> ReplayReport {
    let provider = match (&scenario.session_error, &scenario.session) {
        (Some(error), _) => {
            let provider = StaticSessionProvider::new();
            provider.fail_with(SessionError::Rejected(error.clone()));
            provider
        }
        (None, Some(session)) => StaticSessionProvider::with_session(session.clone()),
        (None, None) => StaticSessionProvider::new(),
    };

    let guard = AuthGuard::with_clock(config, provider, clock);
    let _sweeper = config.sweeper.interval().map(|every| guard.start_sweeper(every));
    let mut outcomes = Vec::new();

    for scripted in &scenario.requests {
        for _ in 0..scripted.repeat {
            let response = guard.validate_request(&scripted.request).await;
            outcomes.push(ReplayOutcome {
                user_id: scripted.request.user_id.clone(),
                endpoint: scripted.request.endpoint.clone(),
                success: response.success,
                error: response.error,
            });
        }
    }

    info!(requests = outcomes.len(), "Replay finished");

    ReplayReport {
        audit_log: guard.audit_logs(outcomes.len().max(DEFAULT_RECENT_LIMIT)),
        outcomes,
        metrics: guard.security_metrics(),
        circuit_breaker: guard.circuit_breaker_status(),
    }
}
