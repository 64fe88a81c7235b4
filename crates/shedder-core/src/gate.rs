//! Per-request admission decision
//!
//! The gate is built once from a [`GateConfig`] and handed to the host
//! server, which calls [`AdmissionGate::admit`] for every inbound request
//! and answers `503 Service Unavailable` on [`Admission::Deny`].
//!
//! The decision path never blocks and never does I/O: one atomic load of
//! the smoothed usage and one or two atomic adds on the counters.

use std::sync::Arc;

use crate::config::GateConfig;
use crate::stat::SheddingStat;
use crate::usage::CurrentUsage;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Continue normal request processing
    Allow,
    /// Short-circuit with "service unavailable"
    Deny,
}

impl Admission {
    #[inline]
    pub fn is_allowed(self) -> bool {
        self == Admission::Allow
    }
}

#[derive(Debug, Clone)]
enum Mode {
    /// No-op pass-through
    Disabled,
    Enabled {
        cpu_threshold: i64,
        probe_path: Arc<str>,
    },
}

/// Admission gate shared across request-handling threads
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    mode: Mode,
    usage: Arc<CurrentUsage>,
    stat: Arc<SheddingStat>,
}

impl AdmissionGate {
    /// Build a gate reading `usage` and counting into `stat`.
    ///
    /// An empty probe path falls back to the default `/health`.
    pub fn new(config: &GateConfig, usage: Arc<CurrentUsage>, stat: Arc<SheddingStat>) -> Self {
        let mode = if config.enabled {
            let probe_path = if config.probe_path.is_empty() {
                crate::config::defaults::PROBE_PATH
            } else {
                config.probe_path.as_str()
            };
            Mode::Enabled {
                cpu_threshold: config.cpu_threshold,
                probe_path: Arc::from(probe_path),
            }
        } else {
            Mode::Disabled
        };
        Self { mode, usage, stat }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.mode, Mode::Enabled { .. })
    }

    /// Decide whether the request for `path` may proceed.
    ///
    /// Probe requests are neither counted nor shed. Otherwise `total` is
    /// bumped, then `drop` if usage is strictly above the threshold, else
    /// `pass`.
    #[inline]
    pub fn admit(&self, path: &str) -> Admission {
        let (cpu_threshold, probe_path) = match &self.mode {
            Mode::Disabled => return Admission::Allow,
            Mode::Enabled { cpu_threshold, probe_path } => (*cpu_threshold, probe_path),
        };

        if path == &**probe_path {
            return Admission::Allow;
        }

        self.stat.increment_total();
        if self.usage.exceeds(cpu_threshold) {
            self.stat.increment_drop();
            Admission::Deny
        } else {
            self.stat.increment_pass();
            Admission::Allow
        }
    }

    pub fn stat(&self) -> &Arc<SheddingStat> {
        &self.stat
    }

    pub fn usage(&self) -> &Arc<CurrentUsage> {
        &self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::ShedSnapshot;

    fn enabled_gate(threshold: i64, usage: f64) -> AdmissionGate {
        let config = GateConfig::new()
            .enabled(true)
            .cpu_threshold(threshold)
            .probe_path("/health");
        let current = Arc::new(CurrentUsage::new());
        current.store(usage);
        AdmissionGate::new(&config, current, Arc::new(SheddingStat::new()))
    }

    #[test]
    fn test_over_threshold_denies() {
        let gate = enabled_gate(50, 80.0);
        assert_eq!(gate.admit("/api/orders"), Admission::Deny);
        assert_eq!(gate.stat().peek(), ShedSnapshot { total: 1, pass: 0, drop: 1 });
    }

    #[test]
    fn test_under_threshold_allows() {
        let gate = enabled_gate(50, 30.0);
        assert_eq!(gate.admit("/api/orders"), Admission::Allow);
        assert_eq!(gate.stat().peek(), ShedSnapshot { total: 1, pass: 1, drop: 0 });
    }

    #[test]
    fn test_equal_to_threshold_allows() {
        let gate = enabled_gate(50, 50.0);
        assert!(gate.admit("/").is_allowed());
        assert_eq!(gate.stat().peek().pass, 1);
    }

    #[test]
    fn test_probe_path_never_counted_or_denied() {
        let gate = enabled_gate(0, 500.0);
        for _ in 0..10 {
            assert_eq!(gate.admit("/health"), Admission::Allow);
        }
        assert!(gate.stat().peek().is_empty());

        // Exact match only
        assert_eq!(gate.admit("/health?full=1"), Admission::Deny);
        assert_eq!(gate.stat().peek().total, 1);
    }

    #[test]
    fn test_disabled_gate_is_pass_through() {
        let config = GateConfig::new().enabled(false).cpu_threshold(0);
        let usage = Arc::new(CurrentUsage::new());
        usage.store(1_000.0);
        let gate = AdmissionGate::new(&config, usage, Arc::new(SheddingStat::new()));

        assert!(!gate.is_enabled());
        for path in ["/", "/health", "/api"] {
            assert_eq!(gate.admit(path), Admission::Allow);
        }
        assert!(gate.stat().peek().is_empty());
    }

    #[test]
    fn test_empty_probe_defaults_to_health() {
        let mut config = GateConfig::new().enabled(true).cpu_threshold(0);
        config.probe_path = String::new();
        let usage = Arc::new(CurrentUsage::new());
        usage.store(99.0);
        let gate = AdmissionGate::new(&config, usage, Arc::new(SheddingStat::new()));

        assert_eq!(gate.admit("/health"), Admission::Allow);
        assert!(gate.stat().peek().is_empty());
    }

    #[test]
    fn test_zero_usage_always_allows() {
        for threshold in [0, 1, 50, 100] {
            let gate = enabled_gate(threshold, 0.0);
            assert!(gate.admit("/work").is_allowed());
        }
    }

    #[test]
    fn test_usage_change_is_seen_by_clones() {
        let gate = enabled_gate(50, 10.0);
        let other = gate.clone();
        assert!(other.admit("/a").is_allowed());
        gate.usage().store(75.0);
        assert!(!other.admit("/a").is_allowed());
        assert_eq!(gate.stat().peek(), ShedSnapshot { total: 2, pass: 1, drop: 1 });
    }
}
