//! Session provider trait for abstracting the identity provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The user a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
}

/// A session as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: SessionUser,
    /// Expiry as epoch seconds; `None` means the provider set no expiry.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, expires_at: Option<i64>) -> Self {
        Self {
            user: SessionUser { id: user_id.into() },
            expires_at,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Whether the expiry lies strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(secs) => secs.saturating_mul(1000) < now.timestamp_millis(),
            None => false,
        }
    }
}

/// Errors reported while fetching the current session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The provider answered, but with an error instead of a session.
    #[error("session rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached or failed unexpectedly.
    #[error("{0}")]
    Unavailable(String),
}

/// Trait for identity provider implementations.
///
/// `Ok(None)` means the provider answered but there is no active session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(&self) -> Result<Option<Session>, SessionError>;
}
