//! Bounded in-memory audit trail of validation attempts.

mod log;

pub use log::{AuditLog, AuditLogEntry, AuditMetrics, DEFAULT_RECENT_LIMIT, MAX_CAPACITY};
