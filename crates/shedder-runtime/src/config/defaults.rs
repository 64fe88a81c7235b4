//! Library defaults for the usage monitor

/// Procfs mount
pub const PROC_ROOT: &str = "/proc";

/// cgroup filesystem mount (v1 hierarchy root or v2 unified mount)
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Sample-and-smooth cadence. With beta 0.95 this averages ~5s.
pub const SAMPLE_INTERVAL_MS: u64 = 250;

/// Usage gauge publish cadence
pub const PUBLISH_INTERVAL_MS: u64 = 1_000;

/// Counter drain cadence
pub const DRAIN_INTERVAL_MS: u64 = 60_000;

/// CFS period used when the period file cannot be read
pub const CFS_PERIOD_US: u64 = 100_000;

/// Clock ticks per second when sysconf is unavailable
pub const CLOCK_TICKS: u64 = 100;
