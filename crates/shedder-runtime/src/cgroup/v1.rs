//! cgroup v1: one mount per controller (or per co-mounted group)

use std::path::{Path, PathBuf};

use shedder_core::{ShedError, ShedResult};

use super::{locate_dir, parse_cpu_list, parse_i64, parse_u64, CgroupLine};
use crate::fs::ControlFs;

/// Directories of the v1 controllers the sampler needs. A controller the
/// process is not attached to (or whose mount is missing) is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupV1 {
    pub cpu: Option<PathBuf>,
    pub cpuacct: Option<PathBuf>,
    pub cpuset: Option<PathBuf>,
}

impl CgroupV1 {
    pub(crate) fn locate<F: ControlFs>(fs: &F, root: &Path, lines: &[CgroupLine<'_>]) -> Self {
        Self {
            cpu: controller_dir(fs, root, lines, "cpu"),
            cpuacct: controller_dir(fs, root, lines, "cpuacct"),
            cpuset: controller_dir(fs, root, lines, "cpuset"),
        }
    }

    pub fn cpu_shares<F: ControlFs>(&self, fs: &F) -> ShedResult<u64> {
        let dir = require(&self.cpu, "cpu")?;
        parse_u64("cpu.shares", &fs.read_to_string(&dir.join("cpu.shares"))?)
    }

    /// `cpu.cfs_quota_us`; `-1` means unlimited
    pub fn cpu_quota_us<F: ControlFs>(&self, fs: &F) -> ShedResult<Option<u64>> {
        let dir = require(&self.cpu, "cpu")?;
        let quota = parse_i64("cpu.cfs_quota_us", &fs.read_to_string(&dir.join("cpu.cfs_quota_us"))?)?;
        Ok(if quota < 0 { None } else { Some(quota as u64) })
    }

    pub fn cpu_period_us<F: ControlFs>(&self, fs: &F) -> ShedResult<u64> {
        let dir = require(&self.cpu, "cpu")?;
        parse_u64("cpu.cfs_period_us", &fs.read_to_string(&dir.join("cpu.cfs_period_us"))?)
    }

    pub fn cpus<F: ControlFs>(&self, fs: &F) -> ShedResult<Vec<u64>> {
        let dir = require(&self.cpuset, "cpuset")?;
        let content = fs
            .read_to_string(&dir.join("cpuset.effective_cpus"))
            .or_else(|_| fs.read_to_string(&dir.join("cpuset.cpus")))?;
        parse_cpu_list("cpuset.cpus", &content)
    }

    /// `cpuacct.usage`, already in nanoseconds
    pub fn usage_ns<F: ControlFs>(&self, fs: &F) -> ShedResult<u64> {
        let dir = require(&self.cpuacct, "cpuacct")?;
        parse_u64("cpuacct.usage", &fs.read_to_string(&dir.join("cpuacct.usage"))?)
    }
}

fn require<'a>(dir: &'a Option<PathBuf>, controller: &'static str) -> ShedResult<&'a Path> {
    dir.as_deref().ok_or(ShedError::NoController(controller))
}

/// Mount directory of `name`, trying the co-mounted name (`cpu,cpuacct`)
/// and then the single-controller alias (`cpu`).
fn controller_dir<F: ControlFs>(
    fs: &F,
    root: &Path,
    lines: &[CgroupLine<'_>],
    name: &str,
) -> Option<PathBuf> {
    let line = lines.iter().find(|l| l.has_controller(name))?;
    let joined = line.controllers.join(",");
    [root.join(&joined), root.join(name)]
        .iter()
        .find_map(|base| locate_dir(fs, base, line.path))
}
