//! Metrics sink implementations
//!
//! [`PrometheusSink`] accumulates observations and renders them in the
//! Prometheus text exposition format, for hosts that serve `/metrics`
//! themselves. [`LogSink`] writes each observation to the log.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;

use crate::traits::MetricsSink;
use crate::shed_info;

/// In-memory Prometheus sink.
///
/// Counters are rendered as `<ns>_requests{type="..."}`, gauges as
/// `<ns>_cpu{type="..."}`. Only the background publishers write to it, so
/// a mutex per family is fine.
#[derive(Debug)]
pub struct PrometheusSink {
    namespace: String,
    counters: Mutex<BTreeMap<String, f64>>,
    gauges: Mutex<BTreeMap<String, f64>>,
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new("shedder")
    }
}

impl PrometheusSink {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            counters: Mutex::new(BTreeMap::new()),
            gauges: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn counter(&self, label: &str) -> Option<f64> {
        self.counters.lock().ok()?.get(label).copied()
    }

    pub fn gauge(&self, label: &str) -> Option<f64> {
        self.gauges.lock().ok()?.get(label).copied()
    }

    /// Render all observations in exposition format.
    pub fn render(&self) -> String {
        let ns = &self.namespace;
        let mut out = String::new();

        let _ = write!(
            out,
            "# HELP {ns}_requests Requests seen by the load shedder\n\
             # TYPE {ns}_requests counter\n"
        );
        if let Ok(counters) = self.counters.lock() {
            for (label, value) in counters.iter() {
                let _ = writeln!(out, "{ns}_requests{{type=\"{label}\"}} {value}");
            }
        }

        let _ = write!(
            out,
            "# HELP {ns}_cpu Smoothed CPU usage in percent of entitlement\n\
             # TYPE {ns}_cpu gauge\n"
        );
        if let Ok(gauges) = self.gauges.lock() {
            for (label, value) in gauges.iter() {
                let _ = writeln!(out, "{ns}_cpu{{type=\"{label}\"}} {value}");
            }
        }
        out
    }
}

impl MetricsSink for PrometheusSink {
    fn add_counter(&self, label: &str, value: f64) {
        if value.is_nan() || value < 0.0 {
            return;
        }
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(label.to_string()).or_insert(0.0) += value;
        }
    }

    fn set_gauge(&self, label: &str, value: f64) {
        if let Ok(mut gauges) = self.gauges.lock() {
            gauges.insert(label.to_string(), value);
        }
    }
}

/// Sink that logs every observation at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn add_counter(&self, label: &str, value: f64) {
        shed_info!("counter {} += {}", label, value);
    }

    fn set_gauge(&self, label: &str, value: f64) {
        shed_info!("gauge {} = {:.2}", label, value);
    }
}
