//! Error types for the Authguard service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operational errors: configuration, I/O and parsing.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<::config::ConfigError> for GuardError {
    fn from(err: ::config::ConfigError) -> Self {
        GuardError::Config(err.to_string())
    }
}

/// Result type alias for Authguard operations.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Why a single validation attempt was refused.
///
/// Every variant is terminal for the call that produced it; the guard never
/// retries on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AuthFailure {
    /// The identity provider is presumed unhealthy; back off.
    #[error("circuit breaker open")]
    CircuitBreakerOpen,

    /// Per-user quota exceeded; back off until the block elapses.
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid or expired session")]
    InvalidSession,

    #[error("user id mismatch")]
    UserIdMismatch,

    #[error("session expired")]
    SessionExpired,

    /// Any other failure surfaced by the provider call.
    #[error("{0}")]
    Unexpected(String),
}

impl AuthFailure {
    /// Whether the caller has to re-authenticate to make progress.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthFailure::InvalidSession | AuthFailure::UserIdMismatch | AuthFailure::SessionExpired
        )
    }
}
