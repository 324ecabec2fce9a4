//! Configuration management for Authguard.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::audit::MAX_CAPACITY;
use crate::error::{GuardError, Result};
use crate::ratelimit::{RateLimitSettings, MAX_DURATION_MS};

/// Prefix for environment overrides, e.g. `AUTHGUARD__RATE_LIMITING__MAX_REQUESTS`.
const ENV_PREFIX: &str = "AUTHGUARD";

/// Main configuration for the Authguard service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Per-user rate limiting
    #[serde(default)]
    pub rate_limiting: RateLimitSettings,

    /// Circuit breaker around the session provider
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Audit log retention
    #[serde(default)]
    pub audit: AuditConfig,

    /// Background sweep of stale rate limit entries
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures needed to open the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the breaker stays open after the last failure, in
    /// milliseconds; at most [`MAX_DURATION_MS`]
    #[serde(default = "default_breaker_timeout")]
    pub timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_ms: default_breaker_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_breaker_timeout() -> u64 {
    60_000
}

/// Audit log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Maximum number of retained entries; at most [`MAX_CAPACITY`]
    #[serde(default = "default_audit_capacity")]
    pub capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: default_audit_capacity(),
        }
    }
}

fn default_audit_capacity() -> usize {
    1000
}

/// Stale entry sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,

    /// Sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            interval_secs: default_sweep_interval(),
        }
    }
}

impl SweeperConfig {
    /// The sweep interval, or `None` when sweeping is disabled.
    pub fn interval(&self) -> Option<Duration> {
        self.enabled.then(|| Duration::from_secs(self.interval_secs))
    }
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    300
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GuardConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading guard configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GuardConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file layered with `AUTHGUARD__*`
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path, "Loading guard configuration");
            builder = builder.add_source(::config::File::with_name(path).required(true));
        }

        let config: GuardConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the guard meaningless.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()?;

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(GuardError::Config(
                "circuit_breaker.failure_threshold must be greater than zero".to_string(),
            ));
        }
        if self.circuit_breaker.timeout_ms > MAX_DURATION_MS {
            return Err(GuardError::Config(format!(
                "circuit_breaker.timeout_ms must be at most {MAX_DURATION_MS}"
            )));
        }
        if self.audit.capacity == 0 {
            return Err(GuardError::Config(
                "audit.capacity must be greater than zero".to_string(),
            ));
        }
        if self.audit.capacity > MAX_CAPACITY {
            return Err(GuardError::Config(format!(
                "audit.capacity must be at most {MAX_CAPACITY}"
            )));
        }
        if self.sweeper.enabled && self.sweeper.interval_secs == 0 {
            return Err(GuardError::Config(
                "sweeper.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
