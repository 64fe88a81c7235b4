//! Usage monitor configuration
//!
//! Filesystem roots come from the environment so the monitor can read a
//! bind-mounted host view; the cadences are fixed.
//!
//! # Example
//!
//! ```rust,ignore
//! use shedder_runtime::config::MonitorConfig;
//!
//! let config = MonitorConfig::from_env();
//! let config = MonitorConfig::new().cgroup_root("/host/sys/fs/cgroup");
//! ```

pub mod defaults;

use std::path::{Path, PathBuf};
use std::time::Duration;

use shedder_core::env::env_get_str;

/// Timer periods of the background threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Sample the CPU and fold into the smoothed usage
    pub sample: Duration,
    /// Publish the smoothed usage gauge
    pub publish: Duration,
    /// Drain the shedding counters
    pub drain: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            sample: Duration::from_millis(defaults::SAMPLE_INTERVAL_MS),
            publish: Duration::from_millis(defaults::PUBLISH_INTERVAL_MS),
            drain: Duration::from_millis(defaults::DRAIN_INTERVAL_MS),
        }
    }
}

/// Monitor configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Where procfs is mounted
    pub proc_root: PathBuf,
    /// Where the cgroup filesystem is mounted
    pub cgroup_root: PathBuf,
    pub(crate) cadence: Cadence,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl MonitorConfig {
    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SHED_PROC_ROOT` - procfs mount point
    /// - `SHED_CGROUP_ROOT` - cgroup filesystem mount point
    pub fn from_env() -> Self {
        Self {
            proc_root: PathBuf::from(env_get_str("SHED_PROC_ROOT", defaults::PROC_ROOT)),
            cgroup_root: PathBuf::from(env_get_str("SHED_CGROUP_ROOT", defaults::CGROUP_ROOT)),
            cadence: Cadence::default(),
        }
    }

    /// Create config with library defaults (no env override).
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from(defaults::PROC_ROOT),
            cgroup_root: PathBuf::from(defaults::CGROUP_ROOT),
            cadence: Cadence::default(),
        }
    }

    // Builder methods

    pub fn proc_root(mut self, path: impl AsRef<Path>) -> Self {
        self.proc_root = path.as_ref().to_path_buf();
        self
    }

    pub fn cgroup_root(mut self, path: impl AsRef<Path>) -> Self {
        self.cgroup_root = path.as_ref().to_path_buf();
        self
    }

    /// Shorter cadences for thread tests
    #[cfg(test)]
    pub(crate) fn cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn cadence_periods(&self) -> Cadence {
        self.cadence
    }

    /// `/proc/stat`
    pub fn proc_stat(&self) -> PathBuf {
        self.proc_root.join("stat")
    }

    /// `/proc/self/cgroup`
    pub fn proc_self_cgroup(&self) -> PathBuf {
        self.proc_root.join("self").join("cgroup")
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Shedder Monitor Configuration:");
        eprintln!("  proc_root:        {}", self.proc_root.display());
        eprintln!("  cgroup_root:      {}", self.cgroup_root.display());
        eprintln!("  sample_interval:  {:?}", self.cadence.sample);
        eprintln!("  publish_interval: {:?}", self.cadence.publish);
        eprintln!("  drain_interval:   {:?}", self.cadence.drain);
    }
}
