//! CPU entitlement of the running process
//!
//! The entitlement is what CPU usage is normalized against: how many cores
//! the cgroup can see, how much CPU it requested (shares, as millicores)
//! and, informationally, its hard CFS limit.
//!
//! Resolution never fails as a whole. Each field is read independently;
//! an unreadable field is logged and left at zero (or `None`), and the
//! sampler reports 0 for a degenerate entitlement.

use std::fmt;
use std::sync::OnceLock;

use shedder_core::{shed_debug, shed_info, shed_warn};

use crate::cgroup::{shares_to_millicores, Cgroup};
use crate::config::{defaults, MonitorConfig};
use crate::fs::{ControlFs, HostFs};
use crate::platform;

/// CPU capacity allotted to the execution context
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Entitlement {
    /// Cores the cgroup may run on
    pub core_count: u64,
    /// CPU share request in thousandths of a core
    pub millicore_request: i64,
    /// `quota / period` when a hard limit is configured
    pub quota_ratio: Option<f64>,
}

impl Entitlement {
    /// Entitlement of a context without CPU accounting
    pub const fn degenerate() -> Self {
        Self {
            core_count: 0,
            millicore_request: 0,
            quota_ratio: None,
        }
    }

    /// The share request in cores, the usage denominator
    #[inline]
    pub fn request_cores(&self) -> f64 {
        self.millicore_request as f64 / 1000.0
    }

    /// True if usage cannot be normalized against this entitlement
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.core_count == 0 || self.millicore_request <= 0
    }
}

impl fmt::Display for Entitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cores={} request={}m", self.core_count, self.millicore_request)?;
        match self.quota_ratio {
            Some(ratio) => write!(f, " limit={:.2} cores", ratio),
            None => write!(f, " limit=unlimited"),
        }
    }
}

/// A resolved entitlement together with the cgroup it was read from.
///
/// The sampler reads cgroup CPU time from the same cgroup.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub entitlement: Entitlement,
    pub cgroup: Option<Cgroup>,
}

impl Resolved {
    pub const fn degenerate() -> Self {
        Self {
            entitlement: Entitlement::degenerate(),
            cgroup: None,
        }
    }
}

/// Resolve the entitlement of the current process.
pub fn resolve<F: ControlFs>(fs: &F, config: &MonitorConfig) -> Resolved {
    let cgroup = match Cgroup::detect(fs, config) {
        Ok(cg) => cg,
        Err(e) => {
            shed_warn!("cgroup detection failed: {}", e);
            return Resolved::degenerate();
        }
    };
    shed_debug!("cgroup {:?}", cgroup);

    let millicore_request = match cgroup.cpu_shares(fs) {
        Ok(shares) => shares_to_millicores(shares),
        Err(e) => {
            shed_warn!("cpu request unavailable: {}", e);
            0
        }
    };

    let quota_ratio = resolve_quota(fs, &cgroup);

    let core_count = match cgroup.cpus(fs) {
        Ok(cpus) if !cpus.is_empty() => cpus.len() as u64,
        other => {
            if let Err(e) = other {
                shed_debug!("cpuset unavailable: {}", e);
            }
            match platform::affinity_cpu_count() {
                Some(n) => n,
                None => {
                    shed_warn!("core count unavailable");
                    0
                }
            }
        }
    };

    let entitlement = Entitlement {
        core_count,
        millicore_request,
        quota_ratio,
    };
    shed_info!("entitlement {:?} cgroup: {}", cgroup.version(), entitlement);

    Resolved {
        entitlement,
        cgroup: Some(cgroup),
    }
}

fn resolve_quota<F: ControlFs>(fs: &F, cgroup: &Cgroup) -> Option<f64> {
    let quota = match cgroup.cpu_quota_us(fs) {
        Ok(quota) => quota?,
        Err(e) => {
            shed_warn!("cpu quota unavailable: {}", e);
            return None;
        }
    };
    let period = match cgroup.cpu_period_us(fs) {
        Ok(period) if period > 0 => period,
        Ok(_) => defaults::CFS_PERIOD_US,
        Err(e) => {
            shed_debug!("cpu period unavailable ({}), assuming {}us", e, defaults::CFS_PERIOD_US);
            defaults::CFS_PERIOD_US
        }
    };
    Some(quota as f64 / period as f64)
}

static HOST: OnceLock<Resolved> = OnceLock::new();

/// The host's entitlement, resolved once per process against the
/// environment-configured roots.
pub fn host() -> &'static Resolved {
    HOST.get_or_init(|| {
        if !platform::SUPPORTED {
            shed_info!("no cgroup CPU accounting on {}, usage is always 0", platform::NAME);
            return Resolved::degenerate();
        }
        resolve(&HostFs, &MonitorConfig::from_env())
    })
}

/// Host entitlement for `config`: the cached one when `config` points at
/// the environment roots, else a fresh resolution.
pub(crate) fn host_for(config: &MonitorConfig) -> Resolved {
    let env = MonitorConfig::from_env();
    if config.proc_root == env.proc_root && config.cgroup_root == env.cgroup_root {
        host().clone()
    } else if platform::SUPPORTED {
        resolve(&HostFs, config)
    } else {
        Resolved::degenerate()
    }
}
