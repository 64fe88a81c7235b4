//! Admission gate configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use shedder_core::config::GateConfig;
//!
//! // Defaults with env overrides
//! let config = GateConfig::from_env();
//!
//! // Or customize programmatically
//! let config = GateConfig::new()
//!     .enabled(true)
//!     .cpu_threshold(75)
//!     .probe_path("/ready");
//! ```

use crate::env::{env_get, env_get_bool, env_get_str};

/// Library defaults
pub mod defaults {
    /// Gates are off unless switched on
    pub const ENABLED: bool = false;

    /// Smoothed CPU percentage above which requests are shed
    pub const CPU_THRESHOLD: i64 = 80;

    /// Route excluded from shedding and counting
    pub const PROBE_PATH: &str = "/health";
}

/// Gate configuration. Immutable once a gate is built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Shed at all; a disabled gate admits everything and counts nothing
    pub enabled: bool,
    /// Smoothed usage strictly above this percentage is shed
    pub cpu_threshold: i64,
    /// Exact request path that is never shed or counted
    pub probe_path: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl GateConfig {
    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SHED_ENABLED` - Enable shedding (0/1, true/false)
    /// - `SHED_CPU_THRESHOLD` - Threshold as a CPU percentage
    /// - `SHED_PROBE_API` - Probe path, `/health` when unset or empty
    pub fn from_env() -> Self {
        Self {
            enabled: env_get_bool("SHED_ENABLED", defaults::ENABLED),
            cpu_threshold: env_get("SHED_CPU_THRESHOLD", defaults::CPU_THRESHOLD),
            probe_path: env_get_str("SHED_PROBE_API", defaults::PROBE_PATH),
        }
    }

    /// Create config with library defaults (no env override).
    pub fn new() -> Self {
        Self {
            enabled: defaults::ENABLED,
            cpu_threshold: defaults::CPU_THRESHOLD,
            probe_path: defaults::PROBE_PATH.to_string(),
        }
    }

    // Builder methods

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn cpu_threshold(mut self, threshold: i64) -> Self {
        self.cpu_threshold = threshold;
        self
    }

    /// An empty path selects the default probe path.
    pub fn probe_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.probe_path = if path.is_empty() {
            defaults::PROBE_PATH.to_string()
        } else {
            path
        };
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu_threshold < 0 {
            return Err(ConfigError::InvalidValue("cpu_threshold must be >= 0"));
        }
        if !self.probe_path.starts_with('/') {
            return Err(ConfigError::InvalidValue("probe_path must start with '/'"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Shedder Gate Configuration:");
        eprintln!("  enabled:        {}", self.enabled);
        eprintln!("  cpu_threshold:  {}", self.cpu_threshold);
        eprintln!("  probe_path:     {}", self.probe_path);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
