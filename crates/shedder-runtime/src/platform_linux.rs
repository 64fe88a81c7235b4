//! Linux platform: procfs and cgroup accounting are available

use nix::sched::{sched_getaffinity, CpuSet};
use nix::unistd::Pid;
use shedder_core::CpuSampler;

use crate::config::{defaults, MonitorConfig};
use crate::entitlement::Resolved;
use crate::fs::HostFs;
use crate::sampler::CgroupCpuSampler;

pub const NAME: &str = "linux";

/// CPU accounting is available
pub const SUPPORTED: bool = true;

/// Kernel USER_HZ, the unit of `/proc/stat` columns
pub fn clock_ticks() -> u64 {
    // Safety: sysconf has no preconditions
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz > 0 {
        hz as u64
    } else {
        defaults::CLOCK_TICKS
    }
}

/// Number of CPUs in this process's scheduler affinity mask
pub fn affinity_cpu_count() -> Option<u64> {
    let set = sched_getaffinity(Pid::from_raw(0)).ok()?;
    let count = (0..CpuSet::count())
        .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
        .count();
    if count == 0 {
        None
    } else {
        Some(count as u64)
    }
}

/// Sampler over the host's procfs and cgroup filesystem
pub fn host_sampler(config: &MonitorConfig, resolved: Resolved) -> Box<dyn CpuSampler> {
    Box::new(CgroupCpuSampler::new(HostFs, config, resolved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_ticks_positive() {
        assert!(clock_ticks() > 0);
    }

    #[test]
    fn test_affinity_has_current_cpu() {
        // A running thread is always allowed on at least one CPU
        assert!(affinity_cpu_count().unwrap_or(1) >= 1);
    }
}
