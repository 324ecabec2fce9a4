//! In-memory session provider with a swappable answer.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::provider::{Session, SessionError, SessionProvider};

/// Returns whatever answer was last configured.
///
/// Useful for tests and for replaying recorded traffic without a live
/// identity provider.
pub struct StaticSessionProvider {
    answer: RwLock<Result<Option<Session>, SessionError>>,
}

impl StaticSessionProvider {
    /// A provider with no active session.
    pub fn new() -> Self {
        Self {
            answer: RwLock::new(Ok(None)),
        }
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            answer: RwLock::new(Ok(Some(session))),
        }
    }

    pub fn set_session(&self, session: Session) {
        *self.answer.write() = Ok(Some(session));
    }

    /// Report no active session from now on.
    pub fn clear(&self) {
        *self.answer.write() = Ok(None);
    }

    pub fn fail_with(&self, error: SessionError) {
        *self.answer.write() = Err(error);
    }
}

impl Default for StaticSessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn get_session(&self) -> Result<Option<Session>, SessionError> {
        let answer = self.answer.read().clone();
        debug!(has_session = matches!(answer, Ok(Some(_))), "Static session lookup");
        answer
    }
}
