//! # shedder-runtime
//!
//! Platform-specific runtime for the shedder admission gate.
//!
//! This crate provides:
//! - cgroup v1/v2 discovery and CPU limit resolution (`cgroup`, `entitlement`)
//! - Machine-wide CPU time from procfs (`procfs`)
//! - The entitlement-normalized CPU sampler (`sampler`)
//! - The usage monitor: smoothing, publishing and counter-drain threads (`monitor`)

pub mod config;
pub mod fs;
pub mod cgroup;
pub mod procfs;
pub mod entitlement;
pub mod sampler;
pub mod timer;
pub mod monitor;

// Re-exports
pub use config::MonitorConfig;
pub use entitlement::{Entitlement, Resolved};
pub use monitor::{MonitorStats, UsageMonitor};
pub use sampler::{CgroupCpuSampler, UsageSample};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod platform_linux;
        pub use platform_linux as platform;
    } else {
        pub mod platform_other;
        pub use platform_other as platform;
    }
}
