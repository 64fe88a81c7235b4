//! Platforms without procfs/cgroup CPU accounting
//!
//! Usage is defined to be 0 here, so gates never shed.

use shedder_core::{CpuSampler, NullSampler};

use crate::config::{defaults, MonitorConfig};
use crate::entitlement::Resolved;

pub const NAME: &str = "unsupported";

/// CPU accounting is not available
pub const SUPPORTED: bool = false;

pub fn clock_ticks() -> u64 {
    defaults::CLOCK_TICKS
}

pub fn affinity_cpu_count() -> Option<u64> {
    None
}

pub fn host_sampler(_config: &MonitorConfig, _resolved: Resolved) -> Box<dyn CpuSampler> {
    Box::new(NullSampler)
}
