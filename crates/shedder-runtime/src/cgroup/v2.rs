//! cgroup v2: a single unified hierarchy

use std::path::{Path, PathBuf};

use shedder_core::{ShedError, ShedResult};

use super::{locate_dir, parse_cpu_list, parse_u64, weight_to_shares};
use crate::fs::ControlFs;

/// Directory of the process's cgroup in the unified hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupV2 {
    pub dir: PathBuf,
}

impl CgroupV2 {
    pub(crate) fn locate<F: ControlFs>(fs: &F, root: &Path, path: &str) -> ShedResult<Self> {
        locate_dir(fs, root, path)
            .map(|dir| Self { dir })
            .ok_or(ShedError::NoController("cpu"))
    }

    /// `cpu.weight` mapped back onto the v1 shares scale
    pub fn cpu_shares<F: ControlFs>(&self, fs: &F) -> ShedResult<u64> {
        let weight = parse_u64("cpu.weight", &fs.read_to_string(&self.dir.join("cpu.weight"))?)?;
        Ok(weight_to_shares(weight))
    }

    /// `cpu.max` as `(quota, period)`; quota `max` is `None`
    pub fn cpu_max<F: ControlFs>(&self, fs: &F) -> ShedResult<(Option<u64>, u64)> {
        parse_cpu_max(&fs.read_to_string(&self.dir.join("cpu.max"))?)
    }

    pub fn cpus<F: ControlFs>(&self, fs: &F) -> ShedResult<Vec<u64>> {
        let content = fs
            .read_to_string(&self.dir.join("cpuset.cpus.effective"))
            .or_else(|_| fs.read_to_string(&self.dir.join("cpuset.cpus")))?;
        parse_cpu_list("cpuset.cpus.effective", &content)
    }

    /// `usage_usec` from `cpu.stat`, converted to nanoseconds
    pub fn usage_ns<F: ControlFs>(&self, fs: &F) -> ShedResult<u64> {
        let stat = fs.read_to_string(&self.dir.join("cpu.stat"))?;
        let usec = stat
            .lines()
            .find_map(|line| match line.split_once(' ') {
                Some(("usage_usec", value)) => Some(parse_u64("cpu.stat", value)),
                _ => None,
            })
            .ok_or_else(|| ShedError::malformed("cpu.stat", "missing usage_usec"))??;
        Ok(usec.saturating_mul(1_000))
    }
}

/// Parse `cpu.max`: `"<quota|max> <period>"`. The period may be omitted,
/// in which case the kernel default applies.
fn parse_cpu_max(content: &str) -> ShedResult<(Option<u64>, u64)> {
    let mut parts = content.split_whitespace();
    let quota = match parts.next() {
        Some("max") => None,
        Some(q) => Some(parse_u64("cpu.max", q)?),
        None => return Err(ShedError::malformed("cpu.max", "empty")),
    };
    let period = match parts.next() {
        Some(p) => parse_u64("cpu.max", p)?,
        None => crate::config::defaults::CFS_PERIOD_US,
    };
    Ok((quota, period))
}
