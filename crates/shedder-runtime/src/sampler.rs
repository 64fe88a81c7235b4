//! Entitlement-normalized CPU sampler
//!
//! Each call reads two cumulative counters, machine-wide CPU time from
//! `/proc/stat` and the cgroup's CPU time across all its cores, and turns
//! the deltas since the previous call into a percentage of the entitlement:
//!
//! ```text
//!   usage = cpu_delta * cores * 100 / (system_delta * request_cores)
//! ```

use std::path::PathBuf;

use shedder_core::{shed_trace, CpuSampler, ShedResult};

use crate::cgroup::Cgroup;
use crate::config::MonitorConfig;
use crate::entitlement::{Entitlement, Resolved};
use crate::fs::{ControlFs, HostFs};
use crate::platform;
use crate::procfs;

/// CPU time elapsed between two consecutive readings, in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageSample {
    /// Machine-wide, all CPUs
    pub system_elapsed: u64,
    /// The cgroup, all its CPUs
    pub process_elapsed: u64,
}

impl UsageSample {
    /// Percentage of `entitlement` consumed over this interval.
    ///
    /// 0 when either delta is zero or the entitlement is degenerate.
    pub fn percent(&self, entitlement: &Entitlement) -> u64 {
        if self.system_elapsed == 0 || self.process_elapsed == 0 || entitlement.is_degenerate() {
            return 0;
        }
        let used = self.process_elapsed as f64 * entitlement.core_count as f64 * 100.0;
        let available = self.system_elapsed as f64 * entitlement.request_cores();
        (used / available) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reading {
    system: u64,
    process: u64,
}

/// Samples the cgroup's CPU usage against its entitlement.
///
/// Stateful: keeps the previous reading. The first call after
/// construction, or after a failed read, only establishes a baseline and
/// reports 0.
pub struct CgroupCpuSampler<F: ControlFs = HostFs> {
    fs: F,
    cgroup: Option<Cgroup>,
    entitlement: Entitlement,
    proc_stat: PathBuf,
    clock_ticks: u64,
    prev: Option<Reading>,
}

impl<F: ControlFs> CgroupCpuSampler<F> {
    pub fn new(fs: F, config: &MonitorConfig, resolved: Resolved) -> Self {
        Self {
            fs,
            cgroup: resolved.cgroup,
            entitlement: resolved.entitlement,
            proc_stat: config.proc_stat(),
            clock_ticks: platform::clock_ticks(),
            prev: None,
        }
    }

    /// Override the `/proc/stat` tick rate
    pub fn clock_ticks(mut self, hz: u64) -> Self {
        self.clock_ticks = hz;
        self
    }

    pub fn entitlement(&self) -> &Entitlement {
        &self.entitlement
    }

    /// Read both counters and return the deltas since the previous call.
    ///
    /// `Ok(None)` when there is nothing to measure: no cgroup, or this
    /// call only established the baseline.
    pub fn next_sample(&mut self) -> ShedResult<Option<UsageSample>> {
        let cgroup = match &self.cgroup {
            Some(cg) => cg,
            None => return Ok(None),
        };

        let read = procfs::system_cpu_usage_ns(&self.fs, &self.proc_stat, self.clock_ticks)
            .and_then(|system| {
                let process = cgroup.usage_all_cpus_ns(&self.fs)?;
                Ok(Reading { system, process })
            });
        let now = match read {
            Ok(now) => now,
            Err(e) => {
                self.prev = None;
                return Err(e);
            }
        };

        Ok(self.prev.replace(now).map(|prev| UsageSample {
            // A counter that went backwards was reset; treat as no progress
            system_elapsed: now.system.saturating_sub(prev.system),
            process_elapsed: now.process.saturating_sub(prev.process),
        }))
    }
}

impl<F: ControlFs> CpuSampler for CgroupCpuSampler<F> {
    fn sample(&mut self) -> ShedResult<u64> {
        let usage = match self.next_sample()? {
            Some(sample) => {
                let usage = sample.percent(&self.entitlement);
                shed_trace!("sample {:?} -> {}%", sample, usage);
                usage
            }
            None => 0,
        };
        Ok(usage)
    }
}
