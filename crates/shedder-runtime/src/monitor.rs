//! Usage monitor
//!
//! Owns the shared usage value and shedding counters, and the two
//! background threads that maintain them:
//!
//! ```text
//!   shed-smoother   every 250ms  sample CPU, fold into CurrentUsage (EWMA)
//!                   every 1s     publish CurrentUsage as gauge "usage"
//!   shed-drain      every 60s    drain counters, publish "total"/"dropped"
//! ```
//!
//! Gates handed out by [`UsageMonitor::gate`] read the usage and count
//! into the counters; they stay valid after the monitor is shut down but
//! then see a frozen usage value.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use shedder_core::constants::{BETA, USAGE_LABEL};
use shedder_core::{
    shed_debug, shed_info, shed_warn, AdmissionGate, CpuSampler, CurrentUsage, Ewma, GateConfig,
    MetricsSink, SheddingStat, ShedError, ShedResult,
};

use crate::config::{Cadence, MonitorConfig};
use crate::entitlement::{self, Entitlement};
use crate::platform;
use crate::timer::{next_wait, Ticker};

/// Statistics from the monitor threads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Successful samples folded into the usage
    pub samples: u64,
    /// Samples that failed or panicked and were folded as 0
    pub sample_failures: u64,
    /// Usage gauge publications
    pub publishes: u64,
    /// Counter drains
    pub drains: u64,
}

impl std::ops::AddAssign for MonitorStats {
    fn add_assign(&mut self, rhs: Self) {
        self.samples += rhs.samples;
        self.sample_failures += rhs.sample_failures;
        self.publishes += rhs.publishes;
        self.drains += rhs.drains;
    }
}

/// Shared usage value, shedding counters and their background threads
pub struct UsageMonitor {
    usage: Arc<CurrentUsage>,
    stat: Arc<SheddingStat>,
    entitlement: Entitlement,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<MonitorStats>>,
}

impl UsageMonitor {
    /// Start monitoring the host with environment configuration.
    ///
    /// The entitlement is the process-wide one from [`entitlement::host`].
    pub fn start(sink: Option<Arc<dyn MetricsSink>>) -> ShedResult<Self> {
        Self::with_config(MonitorConfig::from_env(), sink)
    }

    /// Start monitoring the host through the roots in `config`.
    pub fn with_config(config: MonitorConfig, sink: Option<Arc<dyn MetricsSink>>) -> ShedResult<Self> {
        let resolved = entitlement::host_for(&config);
        let entitlement = resolved.entitlement;
        let sampler = platform::host_sampler(&config, resolved);
        Self::with_sampler(sampler, entitlement, config, sink)
    }

    /// Start with an explicit sampler.
    ///
    /// `entitlement` is informational here; `sampler` is expected to have
    /// normalized against it already.
    pub fn with_sampler<S>(
        sampler: S,
        entitlement: Entitlement,
        config: MonitorConfig,
        sink: Option<Arc<dyn MetricsSink>>,
    ) -> ShedResult<Self>
    where
        S: CpuSampler + 'static,
    {
        let usage = Arc::new(CurrentUsage::new());
        let stat = Arc::new(SheddingStat::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let cadence = config.cadence_periods();

        let mut monitor = Self {
            usage: usage.clone(),
            stat: stat.clone(),
            entitlement,
            shutdown: shutdown.clone(),
            threads: Vec::with_capacity(2),
        };

        let smoother = {
            let sink = sink.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("shed-smoother".into())
                .spawn(move || smoother_loop(sampler, usage, sink, cadence, shutdown))
                .map_err(|e| ShedError::SpawnFailed(e.to_string()))?
        };
        monitor.threads.push(smoother);

        // On failure `monitor` is dropped here, stopping the smoother
        let drain = thread::Builder::new()
            .name("shed-drain".into())
            .spawn(move || drain_loop(stat, sink, cadence, shutdown))
            .map_err(|e| ShedError::SpawnFailed(e.to_string()))?;
        monitor.threads.push(drain);

        shed_info!(
            "usage monitor started on {} ({}), sample={:?} publish={:?} drain={:?}",
            platform::NAME,
            entitlement,
            cadence.sample,
            cadence.publish,
            cadence.drain
        );
        Ok(monitor)
    }

    /// Admission gate reading this monitor's usage and counters
    pub fn gate(&self, config: &GateConfig) -> AdmissionGate {
        AdmissionGate::new(config, self.usage.clone(), self.stat.clone())
    }

    pub fn usage(&self) -> &Arc<CurrentUsage> {
        &self.usage
    }

    pub fn stat(&self) -> &Arc<SheddingStat> {
        &self.stat
    }

    pub fn entitlement(&self) -> &Entitlement {
        &self.entitlement
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop both threads and wait for them to exit
    pub fn shutdown(mut self) -> MonitorStats {
        self.stop()
    }

    fn stop(&mut self) -> MonitorStats {
        self.shutdown.store(true, Ordering::Release);
        for handle in &self.threads {
            handle.thread().unpark();
        }
        let mut stats = MonitorStats::default();
        for handle in self.threads.drain(..) {
            match handle.join() {
                Ok(s) => stats += s,
                Err(_) => shed_warn!("monitor thread panicked"),
            }
        }
        stats
    }
}

impl Drop for UsageMonitor {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for UsageMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageMonitor")
            .field("usage", &self.usage.load())
            .field("entitlement", &self.entitlement)
            .field("threads", &self.threads.len())
            .finish()
    }
}

/// Smoothing and publishing on one thread, whichever deadline is next
fn smoother_loop<S: CpuSampler>(
    mut sampler: S,
    usage: Arc<CurrentUsage>,
    sink: Option<Arc<dyn MetricsSink>>,
    cadence: Cadence,
    shutdown: Arc<AtomicBool>,
) -> MonitorStats {
    let ewma = Ewma::new(BETA);
    let start = Instant::now();
    let mut sample = Ticker::new(cadence.sample, start);
    let mut publish = Ticker::new(cadence.publish, start);
    let mut stats = MonitorStats::default();
    let mut consecutive_failures = 0u64;

    while !shutdown.load(Ordering::Acquire) {
        let now = Instant::now();

        if sample.fire(now) {
            match guarded(|| sample_tick(&mut sampler, &ewma, &usage)) {
                Ok(_) => {
                    if consecutive_failures > 0 {
                        shed_info!("sampling recovered after {} failures", consecutive_failures);
                    }
                    consecutive_failures = 0;
                    stats.samples += 1;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    stats.sample_failures += 1;
                    if consecutive_failures == 1 {
                        shed_warn!("cpu sample failed: {}", e);
                    } else {
                        shed_debug!("cpu sample failed ({} in a row): {}", consecutive_failures, e);
                    }
                    ewma.update(&usage, 0);
                }
            }
        }

        if publish.fire(now) {
            match guarded(|| Ok(publish_tick(&usage, sink.as_deref()))) {
                Ok(_) => stats.publishes += 1,
                Err(e) => shed_warn!("usage publish failed: {}", e),
            }
        }

        let wait = next_wait(&[&sample, &publish], Instant::now());
        if !wait.is_zero() {
            thread::park_timeout(wait);
        }
    }
    stats
}

/// Run one tick body, turning a panic into [`ShedError::Panicked`] so
/// the loop survives a faulty sampler or sink.
fn guarded<T>(tick: impl FnOnce() -> ShedResult<T>) -> ShedResult<T> {
    panic::catch_unwind(AssertUnwindSafe(tick)).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Err(ShedError::Panicked(msg))
    })
}

fn sample_tick<S: CpuSampler>(sampler: &mut S, ewma: &Ewma, usage: &CurrentUsage) -> ShedResult<f64> {
    let raw = sampler.sample()?;
    Ok(ewma.update(usage, raw))
}

fn publish_tick(usage: &CurrentUsage, sink: Option<&dyn MetricsSink>) -> f64 {
    let value = usage.published();
    if let Some(sink) = sink {
        sink.set_gauge(USAGE_LABEL, value);
    }
    value
}

fn drain_loop(
    stat: Arc<SheddingStat>,
    sink: Option<Arc<dyn MetricsSink>>,
    cadence: Cadence,
    shutdown: Arc<AtomicBool>,
) -> MonitorStats {
    let mut drain = Ticker::new(cadence.drain, Instant::now());
    let mut stats = MonitorStats::default();

    while !shutdown.load(Ordering::Acquire) {
        if drain.fire(Instant::now()) {
            match guarded(|| Ok(stat.flush(sink.as_deref()))) {
                Ok(snap) => {
                    shed_debug!("drained total={} pass={} drop={}", snap.total, snap.pass, snap.drop);
                    stats.drains += 1;
                }
                Err(e) => shed_warn!("counter drain failed: {}", e),
            }
        }
        let wait = drain.remaining(Instant::now());
        if !wait.is_zero() {
            thread::park_timeout(wait);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use shedder_core::Admission;

    fn quiet() {
        shedder_core::logging::set_log_level(shedder_core::logging::LogLevel::Off);
    }

    struct ScriptedSampler {
        script: Vec<ShedResult<u64>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSampler {
        fn new(script: Vec<ShedResult<u64>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (Self { script, calls: calls.clone() }, calls)
        }
    }

    impl CpuSampler for ScriptedSampler {
        // Repeats the last entry once the script is exhausted
        fn sample(&mut self) -> ShedResult<u64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let i = n.min(self.script.len() - 1);
            self.script[i].clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        counters: Mutex<Vec<(String, f64)>>,
        gauges: Mutex<Vec<(String, f64)>>,
    }

    impl RecordingSink {
        fn counter_sum(&self, label: &str) -> f64 {
            self.counters
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _)| l == label)
                .map(|(_, v)| v)
                .sum()
        }

        fn gauge_count(&self, label: &str) -> usize {
            self.gauges.lock().unwrap().iter().filter(|(l, _)| l == label).count()
        }
    }

    impl MetricsSink for RecordingSink {
        fn add_counter(&self, label: &str, value: f64) {
            self.counters.lock().unwrap().push((label.to_string(), value));
        }

        fn set_gauge(&self, label: &str, value: f64) {
            self.gauges.lock().unwrap().push((label.to_string(), value));
        }
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig::new().cadence(Cadence {
            sample: Duration::from_millis(5),
            publish: Duration::from_millis(10),
            drain: Duration::from_millis(20),
        })
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_smoothing_and_publishing() {
        quiet();
        let (sampler, calls) = ScriptedSampler::new(vec![Ok(100)]);
        let sink = Arc::new(RecordingSink::default());
        let monitor = UsageMonitor::with_sampler(
            sampler,
            Entitlement::degenerate(),
            fast_config(),
            Some(sink.clone() as Arc<dyn MetricsSink>),
        )
        .unwrap();

        assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 10));
        assert!(wait_for(|| sink.gauge_count(USAGE_LABEL) >= 2));
        let usage = monitor.usage().load();
        assert!(usage > 0.0 && usage < 100.0, "usage = {}", usage);

        let stats = monitor.shutdown();
        assert!(stats.samples >= 10);
        assert!(stats.publishes >= 2);
        assert_eq!(stats.sample_failures, 0);
    }

    #[test]
    fn test_failing_sampler_keeps_running() {
        quiet();
        let (sampler, calls) = ScriptedSampler::new(vec![
            Err(ShedError::malformed("cpu stats", "garbage")),
        ]);
        let monitor =
            UsageMonitor::with_sampler(sampler, Entitlement::degenerate(), fast_config(), None)
                .unwrap();

        assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 5));
        assert_eq!(monitor.usage().load(), 0.0);

        let stats = monitor.shutdown();
        assert!(stats.sample_failures >= 5);
        assert_eq!(stats.samples, 0);
    }

    #[test]
    fn test_failure_decays_usage() {
        quiet();
        let mut script: Vec<ShedResult<u64>> = vec![Ok(100); 20];
        script.push(Err(ShedError::Unsupported));
        let (sampler, calls) = ScriptedSampler::new(script);
        let monitor =
            UsageMonitor::with_sampler(sampler, Entitlement::degenerate(), fast_config(), None)
                .unwrap();

        assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 21));
        let peak = monitor.usage().load();
        let seen = calls.load(Ordering::SeqCst);
        assert!(wait_for(|| calls.load(Ordering::SeqCst) >= seen + 2));
        assert!(monitor.usage().load() < peak);
        monitor.shutdown();
    }

    #[test]
    fn test_drain_publishes_counters() {
        quiet();
        let (sampler, _) = ScriptedSampler::new(vec![Ok(0)]);
        let sink = Arc::new(RecordingSink::default());
        let monitor = UsageMonitor::with_sampler(
            sampler,
            Entitlement::degenerate(),
            fast_config(),
            Some(sink.clone() as Arc<dyn MetricsSink>),
        )
        .unwrap();

        let gate = monitor.gate(&GateConfig::new().enabled(true).cpu_threshold(50));
        for _ in 0..10 {
            assert_eq!(gate.admit("/api"), Admission::Allow);
        }
        assert_eq!(gate.admit("/health"), Admission::Allow);

        assert!(wait_for(|| sink.counter_sum("total") >= 10.0));
        assert_eq!(sink.counter_sum("total"), 10.0);
        assert_eq!(sink.counter_sum("dropped"), 0.0);
        assert!(monitor.shutdown().drains >= 1);
    }

    #[test]
    fn test_gate_sheds_above_threshold() {
        quiet();
        let (sampler, _) = ScriptedSampler::new(vec![Ok(0)]);
        let monitor =
            UsageMonitor::with_sampler(sampler, Entitlement::degenerate(), MonitorConfig::new(), None)
                .unwrap();
        let gate = monitor.gate(&GateConfig::new().enabled(true).cpu_threshold(50));

        monitor.usage().store(80.0);
        assert_eq!(gate.admit("/api"), Admission::Deny);
        monitor.usage().store(30.0);
        assert_eq!(gate.admit("/api"), Admission::Allow);

        let snap = monitor.stat().peek();
        assert_eq!((snap.total, snap.pass, snap.drop), (2, 1, 1));
        monitor.shutdown();
    }

    #[test]
    fn test_shutdown_is_prompt() {
        quiet();
        // Default cadences: the drain thread would otherwise sleep for 60s
        let monitor = UsageMonitor::with_sampler(
            shedder_core::NullSampler,
            Entitlement::degenerate(),
            MonitorConfig::new(),
            None,
        )
        .unwrap();
        assert!(!monitor.is_shutdown_requested());

        let start = Instant::now();
        let stats = monitor.shutdown();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(stats.drains, 0);
    }

    #[test]
    fn test_drop_stops_threads() {
        quiet();
        let (sampler, calls) = ScriptedSampler::new(vec![Ok(1)]);
        let monitor =
            UsageMonitor::with_sampler(sampler, Entitlement::degenerate(), fast_config(), None)
                .unwrap();
        assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 2));
        drop(monitor);

        let after_drop = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }

    struct PanicAfter {
        ok: usize,
        calls: Arc<AtomicUsize>,
    }

    impl CpuSampler for PanicAfter {
        fn sample(&mut self) -> ShedResult<u64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.ok {
                panic!("counter source vanished");
            }
            Ok(100)
        }
    }

    struct PanickingSink;

    impl MetricsSink for PanickingSink {
        fn add_counter(&self, _label: &str, _value: f64) {
            panic!("sink down");
        }

        fn set_gauge(&self, _label: &str, _value: f64) {
            panic!("sink down");
        }
    }

    #[test]
    fn test_guarded_catches_panics() {
        quiet();
        assert_eq!(guarded(|| Ok(7u64)), Ok(7));
        assert_eq!(
            guarded::<u64>(|| panic!("boom")),
            Err(ShedError::Panicked("boom".to_string()))
        );
        assert_eq!(
            guarded::<u64>(|| panic!("bad {}", 42)),
            Err(ShedError::Panicked("bad 42".to_string()))
        );
    }

    #[test]
    fn test_panicking_sampler_fails_open() {
        quiet();
        let calls = Arc::new(AtomicUsize::new(0));
        let sampler = PanicAfter {
            ok: 30,
            calls: calls.clone(),
        };
        let monitor =
            UsageMonitor::with_sampler(sampler, Entitlement::degenerate(), fast_config(), None)
                .unwrap();
        let gate = monitor.gate(&GateConfig::new().enabled(true).cpu_threshold(50));

        // Sampling continues past the first panic and decays the usage
        assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 90));
        let usage = monitor.usage().load();
        assert!(usage < 50.0, "usage = {}", usage);
        assert_eq!(gate.admit("/api"), Admission::Allow);

        let stats = monitor.shutdown();
        assert_eq!(stats.samples, 30);
        assert!(stats.sample_failures >= 59);
    }

    #[test]
    fn test_panicking_sink_keeps_threads_alive() {
        quiet();
        let (sampler, calls) = ScriptedSampler::new(vec![Ok(0)]);
        let monitor = UsageMonitor::with_sampler(
            sampler,
            Entitlement::degenerate(),
            fast_config(),
            Some(Arc::new(PanickingSink) as Arc<dyn MetricsSink>),
        )
        .unwrap();
        let gate = monitor.gate(&GateConfig::new().enabled(true));
        assert_eq!(gate.admit("/api"), Admission::Allow);

        assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 40));
        let stats = monitor.shutdown();
        assert!(stats.samples >= 39);
        assert_eq!(stats.publishes, 0);
        assert_eq!(stats.drains, 0);
    }

    #[test]
    fn test_publish_tick_clamps() {
        quiet();
        let usage = CurrentUsage::new();
        usage.store(-3.0);
        let sink = RecordingSink::default();
        assert_eq!(publish_tick(&usage, Some(&sink)), 0.0);
        assert_eq!(sink.gauges.lock().unwrap()[0], (USAGE_LABEL.to_string(), 0.0));
        assert_eq!(publish_tick(&usage, None), 0.0);
    }
}
