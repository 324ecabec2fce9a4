//! Request and response types for the validation guard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditLogEntry;
use crate::error::AuthFailure;
use crate::session::Session;

/// Method assumed for handlers wrapped without an explicit request.
const DEFAULT_METHOD: &str = "POST";

/// One call that needs to be authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub user_id: String,
    pub endpoint: String,
    pub method: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AuthRequest {
    pub fn new(
        user_id: impl Into<String>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            endpoint: endpoint.into(),
            method: method.into(),
            timestamp: Utc::now(),
            ip: None,
            user_agent: None,
        }
    }

    /// A `POST` request to `endpoint` stamped with the current time.
    pub fn for_endpoint(user_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(user_id, endpoint, DEFAULT_METHOD)
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Result of a validation attempt. Callers must check `success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AuthFailure>,
    /// The entry written to the audit log for this attempt
    pub audit_log: AuditLogEntry,
}

impl AuthResponse {
    pub(crate) fn granted(session: Session, audit_log: AuditLogEntry) -> Self {
        Self {
            success: true,
            user_id: Some(session.user.id.clone()),
            session: Some(session),
            error: None,
            audit_log,
        }
    }

    pub(crate) fn refused(failure: AuthFailure, audit_log: AuditLogEntry) -> Self {
        Self {
            success: false,
            user_id: None,
            session: None,
            error: Some(failure),
            audit_log,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.error == Some(AuthFailure::RateLimited)
    }

    /// Convert into the session on success or the failure reason otherwise.
    pub fn into_result(self) -> Result<Session, AuthFailure> {
        match (self.session, self.error) {
            (Some(session), None) if self.success => Ok(session),
            (_, Some(failure)) => Err(failure),
            _ => Err(AuthFailure::Unexpected(
                "authentication validation failed".to_string(),
            )),
        }
    }
}
