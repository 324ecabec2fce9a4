//! Audit log storage.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthFailure;

/// Number of entries returned by [`AuditLog::recent`] when callers have no
/// preference.
pub const DEFAULT_RECENT_LIMIT: usize = 100;

/// Largest accepted `audit.capacity`.
pub const MAX_CAPACITY: usize = 1_000_000;

/// Slots reserved up front; the queue grows on demand past this.
const INITIAL_SLOTS: usize = 1024;

/// One validation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub endpoint: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub success: bool,
    /// Typed reason for a refused attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<AuthFailure>,
    /// Human-readable form of `failure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response_time_ms: u64,
}

/// Aggregates over the retained entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditMetrics {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub rate_limited_requests: usize,
    pub average_response_time_ms: f64,
}

/// Fixed-capacity FIFO of audit entries; the oldest entry is evicted first.
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditLogEntry>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(INITIAL_SLOTS))),
            capacity,
        }
    }

    pub fn record(&self, entry: AuditLogEntry) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The last `limit` entries, oldest first and newest last.
    pub fn recent(&self, limit: usize) -> Vec<AuditLogEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn metrics(&self) -> AuditMetrics {
        let entries = self.entries.lock();
        let total = entries.len();
        if total == 0 {
            return AuditMetrics::default();
        }

        let successful = entries.iter().filter(|e| e.success).count();
        let rate_limited = entries
            .iter()
            .filter(|e| e.failure == Some(AuthFailure::RateLimited))
            .count();
        let total_time: u64 = entries.iter().map(|e| e.response_time_ms).sum();

        AuditMetrics {
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            rate_limited_requests: rate_limited,
            average_response_time_ms: total_time as f64 / total as f64,
        }
    }
}
