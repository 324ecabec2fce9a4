//! Authguard - In-process API Guard
//!
//! This crate guards calls to protected endpoints with a per-user fixed-window
//! rate limiter, a circuit breaker around the external identity provider and
//! a bounded audit log. All state lives in process memory; it is an advisory
//! layer in front of the real system of record, not a replacement for it.

pub mod audit;
pub mod breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod ratelimit;
pub mod replay;
pub mod session;

pub use error::{AuthFailure, GuardError, Result};
pub use guard::{require_auth, AuthGuard, AuthRequest, AuthResponse};
