//! cgroup discovery and CPU control files
//!
//! Finds the cgroup of the current process from `/proc/self/cgroup` and
//! reads its CPU controls. Both hierarchies are supported:
//!
//! ```text
//!   v1 (per-controller mounts)           v2 (unified mount)
//!   cpu/cpu.shares                       cpu.weight  -> converted to shares
//!   cpu/cpu.cfs_quota_us                 cpu.max     "quota period" | "max period"
//!   cpu/cpu.cfs_period_us
//!   cpuset/cpuset.cpus                   cpuset.cpus.effective
//!   cpuacct/cpuacct.usage (ns)           cpu.stat    usage_usec
//! ```
//!
//! The path listed in `/proc/self/cgroup` is joined onto the mount. Inside
//! a cgroup namespace that directory does not exist and the mount root
//! already is the process's cgroup, so the root is used instead.

mod v1;
mod v2;

pub use v1::CgroupV1;
pub use v2::CgroupV2;

use std::path::{Path, PathBuf};

use shedder_core::{ShedError, ShedResult};

use crate::config::MonitorConfig;
use crate::fs::ControlFs;

/// Which cgroup hierarchy the process's CPU controller lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    V1,
    V2,
}

/// The cgroup of the current process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cgroup {
    V1(CgroupV1),
    V2(CgroupV2),
}

impl Cgroup {
    /// Locate the current process's cgroup.
    ///
    /// Hybrid hosts mount `cpu` on v1 and keep an empty v2 hierarchy, so a
    /// v1 `cpu` controller wins over the `0::` line.
    pub fn detect<F: ControlFs>(fs: &F, config: &MonitorConfig) -> ShedResult<Self> {
        let content = fs.read_to_string(&config.proc_self_cgroup())?;
        let lines = parse_proc_cgroup(&content)?;

        if lines.iter().any(|l| l.has_controller("cpu")) {
            return Ok(Cgroup::V1(CgroupV1::locate(fs, &config.cgroup_root, &lines)));
        }

        let unified = lines.iter().find(|l| l.id == "0" && l.controllers.is_empty());
        if let Some(line) = unified {
            if fs.exists(&config.cgroup_root.join("cgroup.controllers")) {
                return CgroupV2::locate(fs, &config.cgroup_root, line.path).map(Cgroup::V2);
            }
        }

        Err(ShedError::NoController("cpu"))
    }

    pub fn version(&self) -> CgroupVersion {
        match self {
            Cgroup::V1(_) => CgroupVersion::V1,
            Cgroup::V2(_) => CgroupVersion::V2,
        }
    }

    /// CPU shares on the v1 scale (1024 per core)
    pub fn cpu_shares<F: ControlFs>(&self, fs: &F) -> ShedResult<u64> {
        match self {
            Cgroup::V1(cg) => cg.cpu_shares(fs),
            Cgroup::V2(cg) => cg.cpu_shares(fs),
        }
    }

    /// CFS quota in microseconds, `None` when unlimited
    pub fn cpu_quota_us<F: ControlFs>(&self, fs: &F) -> ShedResult<Option<u64>> {
        match self {
            Cgroup::V1(cg) => cg.cpu_quota_us(fs),
            Cgroup::V2(cg) => cg.cpu_max(fs).map(|(quota, _)| quota),
        }
    }

    /// CFS period in microseconds
    pub fn cpu_period_us<F: ControlFs>(&self, fs: &F) -> ShedResult<u64> {
        match self {
            Cgroup::V1(cg) => cg.cpu_period_us(fs),
            Cgroup::V2(cg) => cg.cpu_max(fs).map(|(_, period)| period),
        }
    }

    /// CPUs the cgroup may run on
    pub fn cpus<F: ControlFs>(&self, fs: &F) -> ShedResult<Vec<u64>> {
        match self {
            Cgroup::V1(cg) => cg.cpus(fs),
            Cgroup::V2(cg) => cg.cpus(fs),
        }
    }

    /// Cumulative CPU time of the cgroup across all its CPUs, in ns
    pub fn usage_all_cpus_ns<F: ControlFs>(&self, fs: &F) -> ShedResult<u64> {
        match self {
            Cgroup::V1(cg) => cg.usage_ns(fs),
            Cgroup::V2(cg) => cg.usage_ns(fs),
        }
    }
}

/// One line of `/proc/self/cgroup`: `hierarchy-id:controllers:path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CgroupLine<'a> {
    pub id: &'a str,
    pub controllers: Vec<&'a str>,
    pub path: &'a str,
}

impl CgroupLine<'_> {
    pub fn has_controller(&self, name: &str) -> bool {
        self.controllers.iter().any(|c| *c == name)
    }
}

pub(crate) fn parse_proc_cgroup(content: &str) -> ShedResult<Vec<CgroupLine<'_>>> {
    let mut lines = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut parts = line.splitn(3, ':');
        let (id, controllers, path) = match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(controllers), Some(path)) => (id, controllers, path),
            _ => return Err(ShedError::malformed("/proc/self/cgroup", line)),
        };
        lines.push(CgroupLine {
            id,
            controllers: controllers.split(',').filter(|c| !c.is_empty()).collect(),
            path,
        });
    }
    if lines.is_empty() {
        return Err(ShedError::malformed("/proc/self/cgroup", "no entries"));
    }
    Ok(lines)
}

/// `base/rel` if that directory exists, else `base` if it exists.
pub(crate) fn locate_dir<F: ControlFs>(fs: &F, base: &Path, rel: &str) -> Option<PathBuf> {
    let rel = rel.trim_start_matches('/');
    if !rel.is_empty() {
        let nested = base.join(rel);
        if fs.is_dir(&nested) {
            return Some(nested);
        }
    }
    if fs.is_dir(base) {
        Some(base.to_path_buf())
    } else {
        None
    }
}

pub(crate) fn parse_u64(what: &'static str, s: &str) -> ShedResult<u64> {
    s.trim()
        .parse()
        .map_err(|_| ShedError::malformed(what, s.trim()))
}

pub(crate) fn parse_i64(what: &'static str, s: &str) -> ShedResult<i64> {
    s.trim()
        .parse()
        .map_err(|_| ShedError::malformed(what, s.trim()))
}

/// Kernel upper bound on `NR_CPUS`; CPU ids are below it
pub(crate) const MAX_CPUS: u64 = 8192;

/// Parse a kernel CPU list such as `0-3,8,10-11`.
///
/// Ids at or above [`MAX_CPUS`] are rejected as malformed.
pub(crate) fn parse_cpu_list(what: &'static str, s: &str) -> ShedResult<Vec<u64>> {
    let mut cpus = Vec::new();
    for part in s.trim().split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (lo, hi) = match part.split_once('-') {
            Some((lo, hi)) => (parse_u64(what, lo)?, parse_u64(what, hi)?),
            None => {
                let cpu = parse_u64(what, part)?;
                (cpu, cpu)
            }
        };
        if lo > hi || hi >= MAX_CPUS {
            return Err(ShedError::malformed(what, part));
        }
        cpus.extend(lo..=hi);
    }
    Ok(cpus)
}

/// Kubernetes' mapping from `cpu.weight` (1..=10000) back to v1 shares
/// (2..=262144).
pub(crate) fn weight_to_shares(weight: u64) -> u64 {
    let weight = weight.clamp(1, 10_000);
    2 + ((weight - 1) * 262_142) / 9_999
}

/// v1 shares to thousandths of a core (1024 shares per core)
pub fn shares_to_millicores(shares: u64) -> i64 {
    (shares.saturating_mul(1000) / 1024) as i64
}
