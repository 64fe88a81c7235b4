//! Print the resolved CPU entitlement and the smoothed usage
//!
//! Useful to check what the shedder sees inside a container.
//!
//! # Environment Variables
//!
//! - `SHED_PROC_ROOT`, `SHED_CGROUP_ROOT` - read a bind-mounted host view
//! - `SHED_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `SHED_CPUWATCH_SECS=10` - How long to watch (0 = forever)
//! - `SHED_CPUWATCH_SINK=1` - Also log every gauge/counter publication

use std::sync::Arc;
use std::time::{Duration, Instant};

use shedder::{
    env_get, env_get_bool, host_entitlement, shed_error, LoadShedder, LogSink, MetricsSink,
    MonitorConfig,
};

// SHED_LOG_LEVEL=debug cargo run -p shedder-cpuwatch
fn main() {
    println!("=== shedder cpuwatch ===\n");

    let config = MonitorConfig::from_env();
    config.print();

    let resolved = host_entitlement();
    match &resolved.cgroup {
        Some(cg) => println!("cgroup:      {:?}", cg.version()),
        None => println!("cgroup:      none (usage is always 0)"),
    }
    println!("entitlement: {}\n", resolved.entitlement);

    let verbose = env_get_bool("SHED_CPUWATCH_SINK", false);
    let sink: Option<Arc<dyn MetricsSink>> = if verbose { Some(Arc::new(LogSink)) } else { None };

    let shedder = match LoadShedder::with_config(config, sink) {
        Ok(s) => s,
        Err(e) => {
            shed_error!("cannot start usage monitor: {}", e);
            std::process::exit(1);
        }
    };

    let secs: u64 = env_get("SHED_CPUWATCH_SECS", 10);
    let start = Instant::now();
    while secs == 0 || start.elapsed() < Duration::from_secs(secs) {
        std::thread::sleep(Duration::from_secs(1));
        println!("[{:>5.1}s] usage={:.2}%", start.elapsed().as_secs_f64(), shedder.usage());
    }

    let stats = shedder.shutdown();
    println!(
        "\nsamples={} failures={} publishes={}",
        stats.samples, stats.sample_failures, stats.publishes
    );
    println!("\n=== cpuwatch complete ===");
}
