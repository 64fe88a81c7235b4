//! # shedder-core
//!
//! Core types for the shedder admission gate.
//!
//! This crate is platform-agnostic and performs no I/O. Reading CPU
//! counters and cgroup control files lives in `shedder-runtime`.
//!
//! ## Modules
//!
//! - `usage` - Shared smoothed CPU usage value and the EWMA fold
//! - `stat` - Lock-free total/pass/drop counters and drained snapshots
//! - `gate` - Per-request admission decision
//! - `config` - Gate configuration (env + builder)
//! - `sink` - Metrics sink implementations
//! - `traits` - Seams between core and runtime (sampler, metrics sink)
//! - `error` - Error types
//! - `logging` - Leveled stderr logging macros
//! - `env` - Environment variable utilities

pub mod usage;
pub mod stat;
pub mod gate;
pub mod config;
pub mod sink;
pub mod traits;
pub mod error;
pub mod logging;
pub mod env;

// Re-exports for convenience
pub use usage::{CurrentUsage, Ewma};
pub use stat::{SheddingStat, ShedSnapshot};
pub use gate::{Admission, AdmissionGate};
pub use config::{ConfigError, GateConfig};
pub use sink::{LogSink, PrometheusSink};
pub use traits::{CpuSampler, MetricsSink, NullSampler};
pub use error::{ShedError, ShedResult};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};

/// Metric labels and smoothing constants
pub mod constants {
    /// Counter label for all non-probe requests seen by an enabled gate
    pub const TOTAL_LABEL: &str = "total";

    /// Counter label for shed requests
    pub const DROP_LABEL: &str = "dropped";

    /// Gauge label for the smoothed CPU usage
    pub const USAGE_LABEL: &str = "usage";

    /// EWMA weight of the previous value. With a 250ms sample cadence
    /// this averages over roughly the last 5 seconds.
    pub const BETA: f64 = 0.95;
}
