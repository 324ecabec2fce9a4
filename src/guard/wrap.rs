//! Wrapping handlers so they only run for authorized requests.

use std::future::Future;

use super::request::AuthRequest;
use super::validator::AuthGuard;
use crate::error::AuthFailure;
use crate::session::{Session, SessionProvider};

/// Validate `request` and, only if it passes, run `handler` with the
/// session.
///
/// A refused request returns its [`AuthFailure`] and the handler is never
/// called.
pub async fn require_auth<P, F, Fut, T>(
    guard: &AuthGuard<P>,
    request: &AuthRequest,
    handler: F,
) -> Result<T, AuthFailure>
where
    P: SessionProvider,
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = T>,
{
    let session = guard.validate_request(request).await.into_result()?;
    Ok(handler(session).await)
}
