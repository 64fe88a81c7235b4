//! # shedder - cgroup-aware CPU load shedding
//!
//! Rejects requests while the process uses more of its CPU entitlement
//! than a configured threshold, so an overloaded service fails fast
//! instead of queueing.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use shedder::{Admission, GateConfig, LoadShedder, PrometheusSink};
//!
//! fn main() -> shedder::ShedResult<()> {
//!     let sink = Arc::new(PrometheusSink::default());
//!     let shedder = LoadShedder::start(Some(sink.clone()))?;
//!     let gate = shedder.interceptor(GateConfig::from_env())?;
//!
//!     // Per request:
//!     match gate.admit("/api/orders") {
//!         Admission::Allow => { /* handle */ }
//!         Admission::Deny => { /* answer 503 */ }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   request ──► AdmissionGate::admit(path) ──► Allow / Deny
//!                  │ reads            │ counts
//!                  ▼                  ▼
//!            CurrentUsage        SheddingStat ──(60s drain)──► sink
//!                  ▲
//!                  │ EWMA, every 250ms (gauge to sink every 1s)
//!            CgroupCpuSampler ◄── Entitlement (resolved once)
//!                  │
//!        /proc/stat + cgroup cpuacct / cpu.stat
//! ```

use std::sync::Arc;

// Re-export core types
pub use shedder_core::{
    Admission,
    AdmissionGate,
    ConfigError,
    CpuSampler,
    CurrentUsage,
    GateConfig,
    LogSink,
    MetricsSink,
    NullSampler,
    PrometheusSink,
    ShedError,
    ShedResult,
    ShedSnapshot,
    SheddingStat,
};
pub use shedder_core::constants;

// Re-export logging macros
pub use shedder_core::{shed_log, shed_error, shed_warn, shed_info, shed_debug, shed_trace};
pub use shedder_core::logging::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use shedder_core::{env_get, env_get_bool, env_get_opt, env_get_str};

// Re-export runtime types
pub use shedder_runtime::{
    CgroupCpuSampler,
    Entitlement,
    MonitorConfig,
    MonitorStats,
    UsageMonitor,
    UsageSample,
};
pub use shedder_runtime::entitlement::host as host_entitlement;

/// Handle owning the usage monitor and handing out admission gates.
///
/// Dropping it stops the monitor threads; gates already handed out keep
/// working with the last smoothed usage.
#[derive(Debug)]
pub struct LoadShedder {
    monitor: UsageMonitor,
}

impl LoadShedder {
    /// Initialize logging and start monitoring with environment
    /// configuration.
    pub fn start(sink: Option<Arc<dyn MetricsSink>>) -> ShedResult<Self> {
        init_logging();
        UsageMonitor::start(sink).map(Self::with_monitor)
    }

    /// Start monitoring through the roots in `config`.
    pub fn with_config(config: MonitorConfig, sink: Option<Arc<dyn MetricsSink>>) -> ShedResult<Self> {
        init_logging();
        UsageMonitor::with_config(config, sink).map(Self::with_monitor)
    }

    /// Wrap an already running monitor
    pub fn with_monitor(monitor: UsageMonitor) -> Self {
        Self { monitor }
    }

    /// Build the per-request interceptor for `config`.
    ///
    /// Rejects configurations that fail [`GateConfig::validate`].
    pub fn interceptor(&self, config: GateConfig) -> ShedResult<AdmissionGate> {
        config.validate()?;
        if config.enabled {
            shed_info!(
                "shedding enabled: threshold={}% probe={}",
                config.cpu_threshold,
                config.probe_path
            );
        }
        Ok(self.monitor.gate(&config))
    }

    /// Latest smoothed usage, clamped to >= 0
    pub fn usage(&self) -> f64 {
        self.monitor.usage().published()
    }

    pub fn entitlement(&self) -> &Entitlement {
        self.monitor.entitlement()
    }

    pub fn monitor(&self) -> &UsageMonitor {
        &self.monitor
    }

    /// Stop the monitor threads and return their statistics
    pub fn shutdown(self) -> MonitorStats {
        self.monitor.shutdown()
    }
}
