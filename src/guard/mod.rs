//! Request validation: breaker, rate limit and session checks in one place.

mod request;
mod validator;
mod wrap;

pub use request::{AuthRequest, AuthResponse};
pub use validator::{AuthGuard, CircuitState, SecurityMetrics};
pub use wrap::require_auth;
