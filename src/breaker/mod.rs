//! Circuit breaker around the session provider.

mod circuit;

pub use circuit::{CircuitBreaker, CircuitBreakerStatus};
